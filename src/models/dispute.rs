// src/models/dispute.rs
use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisputeType {
    WrongNumber,
    NotInterested,
    Spam,
    PoorQuality,
    Duplicate,
    Other,
}

impl DisputeType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "wrong_number" => DisputeType::WrongNumber,
            "not_interested" => DisputeType::NotInterested,
            "spam" => DisputeType::Spam,
            "poor_quality" => DisputeType::PoorQuality,
            "duplicate" => DisputeType::Duplicate,
            _ => DisputeType::Other,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DisputeType::WrongNumber => "wrong_number",
            DisputeType::NotInterested => "not_interested",
            DisputeType::Spam => "spam",
            DisputeType::PoorQuality => "poor_quality",
            DisputeType::Duplicate => "duplicate",
            DisputeType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
    PartialRefund,
}

impl DisputeStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "under_review" => DisputeStatus::UnderReview,
            "approved" => DisputeStatus::Approved,
            "rejected" => DisputeStatus::Rejected,
            "partial_refund" => DisputeStatus::PartialRefund,
            _ => DisputeStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DisputeStatus::Pending => "pending",
            DisputeStatus::UnderReview => "under_review",
            DisputeStatus::Approved => "approved",
            DisputeStatus::Rejected => "rejected",
            DisputeStatus::PartialRefund => "partial_refund",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DisputeStatus::Approved | DisputeStatus::Rejected | DisputeStatus::PartialRefund
        )
    }

    /// pending → under_review → {approved, rejected, partial_refund};
    /// under_review may be skipped, terminal states accept nothing.
    pub fn can_transition_to(&self, next: DisputeStatus) -> bool {
        match self {
            DisputeStatus::Pending => next != DisputeStatus::Pending,
            DisputeStatus::UnderReview => next.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallDispute {
    pub id: i64,
    pub workspace_id: i64,
    pub company_id: i64,
    pub call_log_id: i64,
    pub credit_transaction_id: Option<i64>,
    pub dispute_type: DisputeType,
    pub description: Option<String>,
    pub status: DisputeStatus,
    pub refund_amount: Option<Decimal>,
    pub resolution_notes: Option<String>,
    pub resolved_by: Option<i64>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
