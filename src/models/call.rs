// src/models/call.rs
use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallBillingStatus {
    Pending,
    Billed,
    Disputed,
    Refunded,
    Waived,
}

impl CallBillingStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "billed" => CallBillingStatus::Billed,
            "disputed" => CallBillingStatus::Disputed,
            "refunded" => CallBillingStatus::Refunded,
            "waived" => CallBillingStatus::Waived,
            _ => CallBillingStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CallBillingStatus::Pending => "pending",
            CallBillingStatus::Billed => "billed",
            CallBillingStatus::Disputed => "disputed",
            CallBillingStatus::Refunded => "refunded",
            CallBillingStatus::Waived => "waived",
        }
    }
}

/// An inbound call record. Only qualified calls (duration at or above the
/// workspace minimum) are ever moved to `billed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLog {
    pub id: i64,
    pub workspace_id: i64,
    pub company_id: Option<i64>,
    pub campaign_id: Option<i64>,
    pub call_uuid: String,
    pub phone_number: String,
    pub duration_seconds: i32,
    pub postal_code: Option<String>,
    pub service_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub is_qualified: bool,
    pub is_billed: bool,
    pub billing_price: Option<Decimal>,
    pub billing_status: CallBillingStatus,
    pub billed_at: Option<DateTime<Utc>>,
    pub credit_transaction_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
