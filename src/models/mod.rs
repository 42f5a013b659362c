// src/models/mod.rs
pub mod pricing;
pub mod lead;
pub mod call;
pub mod dispute;
pub mod wallet;

pub use pricing::{PricingRule, LeadAttributes, LeadTiming, BillingSettings};
pub use lead::{LeadRequest, LeadStatus, LeadMatch, MatchStatus};
pub use call::{CallLog, CallBillingStatus};
pub use dispute::{CallDispute, DisputeStatus, DisputeType};
pub use wallet::{Wallet, CreditTransaction, TransactionType, TxnRefs};

use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};

// ==================== API DTOs ====================

#[derive(Debug, Deserialize)]
pub struct CreateLeadRequest {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub consumer_name: Option<String>,
    #[serde(default)]
    pub consumer_email: Option<String>,
    #[serde(default)]
    pub consumer_phone: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub budget_min: Option<Decimal>,
    #[serde(default)]
    pub budget_max: Option<Decimal>,
    #[serde(default)]
    pub timing: Option<LeadTiming>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub is_exclusive: bool,
    #[serde(default)]
    pub max_sold_count: Option<i32>,
    #[serde(default)]
    pub services: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateLeadResponse {
    pub id: i64,
    pub lead_price: Decimal,
    pub quality_score: f64,
    pub status: LeadStatus,
}

#[derive(Debug, Serialize)]
pub struct RouteLeadResponse {
    pub matches_created: usize,
    pub status: LeadStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreatePricingRuleRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub service_id: Option<i64>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub timing: Option<LeadTiming>,
    #[serde(default)]
    pub budget_min: Option<Decimal>,
    #[serde(default)]
    pub budget_max: Option<Decimal>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub is_exclusive: Option<bool>,
    pub base_price: Decimal,
    #[serde(default)]
    pub surge_multiplier: Option<Decimal>,
    #[serde(default)]
    pub exclusive_multiplier: Option<Decimal>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ResolvePriceRequest {
    #[serde(default)]
    pub services: Vec<i64>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub timing: Option<LeadTiming>,
    #[serde(default)]
    pub budget_min: Option<Decimal>,
    #[serde(default)]
    pub budget_max: Option<Decimal>,
    #[serde(default)]
    pub property_type: Option<String>,
    #[serde(default)]
    pub is_exclusive: bool,
}

impl ResolvePriceRequest {
    pub fn into_attributes(self) -> LeadAttributes {
        LeadAttributes {
            service_ids: self.services,
            region: self.region,
            city: self.city,
            postal_code: self.postal_code,
            timing: self.timing,
            budget_min: self.budget_min,
            budget_max: self.budget_max,
            property_type: self.property_type,
            is_exclusive: self.is_exclusive,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateBillingSettingsRequest {
    #[serde(default)]
    pub min_duration_seconds: Option<i32>,
    #[serde(default)]
    pub auto_bill_enabled: Option<bool>,
    #[serde(default)]
    pub dispute_window_hours: Option<i64>,
    #[serde(default)]
    pub min_price_per_call: Option<Decimal>,
    #[serde(default)]
    pub max_price_per_call: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct IngestCallRequest {
    #[serde(default)]
    pub call_uuid: Option<String>,
    pub phone_number: String,
    #[serde(default)]
    pub company_id: Option<i64>,
    #[serde(default)]
    pub campaign_id: Option<i64>,
    pub duration_seconds: i32,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub service_id: Option<i64>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

/// Outcome of running a completed call through the billing pipeline.
#[derive(Debug, Serialize)]
pub struct ProcessCallResponse {
    pub call_id: i64,
    pub qualified: bool,
    pub billed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_after: Option<Decimal>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenDisputeRequest {
    pub call_log_id: i64,
    pub dispute_type: DisputeType,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveDisputeRequest {
    pub resolution: DisputeStatus,
    #[serde(default)]
    pub refund_amount: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub resolved_by: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ResolveDisputeResponse {
    pub status: DisputeStatus,
    pub refund_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_transaction_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ManualCreditRequest {
    pub company_id: i64,
    pub amount: Decimal,
    #[serde(default)]
    pub txn_type: Option<TransactionType>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub payment_provider: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeclineMatchRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendQuoteRequest {
    #[serde(default)]
    pub quote_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub price_min: Option<Decimal>,
    #[serde(default)]
    pub price_max: Option<Decimal>,
    #[serde(default)]
    pub eta: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MarkOutcomeRequest {
    pub outcome: String,
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefundLeadRequest {
    pub lead_match_id: i64,
    #[serde(default)]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}
