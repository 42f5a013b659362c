// src/models/pricing.rs
use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeadTiming {
    Asap,
    #[serde(rename = "within_24h")]
    Within24h,
    WithinWeek,
    Flexible,
    Scheduled,
}

impl LeadTiming {
    pub fn from_str(s: &str) -> Self {
        match s {
            "asap" => LeadTiming::Asap,
            "within_24h" => LeadTiming::Within24h,
            "within_week" => LeadTiming::WithinWeek,
            "scheduled" => LeadTiming::Scheduled,
            _ => LeadTiming::Flexible,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LeadTiming::Asap => "asap",
            LeadTiming::Within24h => "within_24h",
            LeadTiming::WithinWeek => "within_week",
            LeadTiming::Flexible => "flexible",
            LeadTiming::Scheduled => "scheduled",
        }
    }
}

/// A conditional price override. Nullable columns are wildcards: a rule
/// constrains a lead only on the attributes it sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingRule {
    pub id: i64,
    pub workspace_id: i64,
    pub name: Option<String>,
    pub service_id: Option<i64>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub timing: Option<LeadTiming>,
    pub budget_min: Option<Decimal>,
    pub budget_max: Option<Decimal>,
    pub property_type: Option<String>,
    pub is_exclusive: Option<bool>,
    pub base_price: Decimal,
    pub surge_multiplier: Decimal,
    pub exclusive_multiplier: Decimal,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// The lead attributes a rule is evaluated against. Built from a
/// `LeadRequest` on intake, or from a `CallLog` for pay-per-call pricing.
#[derive(Debug, Clone, Default)]
pub struct LeadAttributes {
    pub service_ids: Vec<i64>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub timing: Option<LeadTiming>,
    pub budget_min: Option<Decimal>,
    pub budget_max: Option<Decimal>,
    pub property_type: Option<String>,
    pub is_exclusive: bool,
}

impl PricingRule {
    /// Every non-null constraint must be satisfied by the lead.
    pub fn matches(&self, lead: &LeadAttributes) -> bool {
        if let Some(service_id) = self.service_id {
            if !lead.service_ids.contains(&service_id) {
                return false;
            }
        }
        if let Some(region) = &self.region {
            if lead.region.as_deref() != Some(region.as_str()) {
                return false;
            }
        }
        if let Some(city) = &self.city {
            if lead.city.as_deref() != Some(city.as_str()) {
                return false;
            }
        }
        if let Some(postal_code) = &self.postal_code {
            if lead.postal_code.as_deref() != Some(postal_code.as_str()) {
                return false;
            }
        }
        if let Some(timing) = self.timing {
            if lead.timing != Some(timing) {
                return false;
            }
        }
        // Budget windows match on range overlap.
        if let Some(budget_min) = self.budget_min {
            match lead.budget_max {
                Some(lead_max) if lead_max >= budget_min => {}
                _ => return false,
            }
        }
        if let Some(budget_max) = self.budget_max {
            match lead.budget_min {
                Some(lead_min) if lead_min <= budget_max => {}
                _ => return false,
            }
        }
        if let Some(property_type) = &self.property_type {
            if lead.property_type.as_deref() != Some(property_type.as_str()) {
                return false;
            }
        }
        if let Some(exclusive) = self.is_exclusive {
            if lead.is_exclusive != exclusive {
                return false;
            }
        }
        true
    }
}

/// Per-workspace pay-per-call billing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingSettings {
    pub workspace_id: i64,
    pub min_duration_seconds: i32,
    pub auto_bill_enabled: bool,
    pub dispute_window_hours: i64,
    pub min_price_per_call: Option<Decimal>,
    pub max_price_per_call: Option<Decimal>,
}

impl BillingSettings {
    pub fn defaults(workspace_id: i64) -> Self {
        Self {
            workspace_id,
            min_duration_seconds: 90,
            auto_bill_enabled: true,
            dispute_window_hours: 72,
            min_price_per_call: None,
            max_price_per_call: None,
        }
    }
}
