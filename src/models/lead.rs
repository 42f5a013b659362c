// src/models/lead.rs
use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};

use super::pricing::LeadTiming;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Routing,
    Routed,
    Partial,
    Closed,
    Expired,
    Spam,
    Duplicate,
}

impl LeadStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "routing" => LeadStatus::Routing,
            "routed" => LeadStatus::Routed,
            "partial" => LeadStatus::Partial,
            "closed" => LeadStatus::Closed,
            "expired" => LeadStatus::Expired,
            "spam" => LeadStatus::Spam,
            "duplicate" => LeadStatus::Duplicate,
            _ => LeadStatus::New,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Routing => "routing",
            LeadStatus::Routed => "routed",
            LeadStatus::Partial => "partial",
            LeadStatus::Closed => "closed",
            LeadStatus::Expired => "expired",
            LeadStatus::Spam => "spam",
            LeadStatus::Duplicate => "duplicate",
        }
    }

    pub fn is_routable(&self) -> bool {
        matches!(self, LeadStatus::New | LeadStatus::Routing)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadRequest {
    pub id: i64,
    pub workspace_id: i64,
    pub source: String,
    pub consumer_name: Option<String>,
    pub consumer_email: Option<String>,
    pub consumer_phone: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: String,
    pub postal_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub budget_min: Option<Decimal>,
    pub budget_max: Option<Decimal>,
    pub timing: LeadTiming,
    pub title: Option<String>,
    pub description: Option<String>,
    pub property_type: Option<String>,
    pub is_exclusive: bool,
    pub max_sold_count: i32,
    pub current_sold_count: i32,
    pub lead_price_final: Decimal,
    pub quality_score: Option<f64>,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl LeadRequest {
    pub fn is_sold_out(&self) -> bool {
        self.current_sold_count >= self.max_sold_count
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Offered,
    Viewed,
    Accepted,
    Declined,
    Expired,
    Won,
    Lost,
    Refunded,
}

impl MatchStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "viewed" => MatchStatus::Viewed,
            "accepted" => MatchStatus::Accepted,
            "declined" => MatchStatus::Declined,
            "expired" => MatchStatus::Expired,
            "won" => MatchStatus::Won,
            "lost" => MatchStatus::Lost,
            "refunded" => MatchStatus::Refunded,
            _ => MatchStatus::Offered,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MatchStatus::Offered => "offered",
            MatchStatus::Viewed => "viewed",
            MatchStatus::Accepted => "accepted",
            MatchStatus::Declined => "declined",
            MatchStatus::Expired => "expired",
            MatchStatus::Won => "won",
            MatchStatus::Lost => "lost",
            MatchStatus::Refunded => "refunded",
        }
    }

    /// An open offer the provider can still act on.
    pub fn is_open(&self) -> bool {
        matches!(self, MatchStatus::Offered | MatchStatus::Viewed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadMatch {
    pub id: i64,
    pub workspace_id: i64,
    pub lead_request_id: i64,
    pub company_id: i64,
    pub pro_id: Option<i64>,
    pub distance_km: Option<f64>,
    pub lead_price: Decimal,
    pub status: MatchStatus,
    pub offered_at: DateTime<Utc>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub response_time_minutes: Option<i32>,
    pub won_value: Option<Decimal>,
    pub lost_reason: Option<String>,
    pub credit_transaction_id: Option<i64>,
    pub refund_transaction_id: Option<i64>,
}
