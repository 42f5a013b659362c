// src/services/pricing.rs

use crate::models::{
    PricingRule, LeadAttributes, LeadTiming, BillingSettings, CreatePricingRuleRequest,
    UpdateBillingSettingsRequest,
};
use crate::database::DbPool;
use crate::cache::{RedisClient, CacheKeys};
use crate::error::BillingError;
use rust_decimal::Decimal;
use once_cell::sync::Lazy;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

const RULE_CACHE_TTL: usize = 300;

/// System fallback when no rule matches: $25 base, no surge, 3x exclusive.
static DEFAULT_BASE_PRICE: Lazy<Decimal> = Lazy::new(|| Decimal::new(2500, 2));
static DEFAULT_SURGE_MULTIPLIER: Lazy<Decimal> = Lazy::new(|| Decimal::ONE);
static DEFAULT_EXCLUSIVE_MULTIPLIER: Lazy<Decimal> = Lazy::new(|| Decimal::from(3));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub price: Decimal,
    pub rule_id: Option<i64>,
}

/// Resolve the price for a lead against a rule set. Pure and deterministic:
/// active rules ordered by priority descending (ties broken by lower id),
/// first match wins. Multipliers compose multiplicatively - the exclusive
/// multiplier when the lead is exclusive, the surge multiplier when timing
/// is asap.
pub fn resolve_price(lead: &LeadAttributes, rules: &[PricingRule]) -> Quote {
    let mut candidates: Vec<&PricingRule> = rules.iter().filter(|r| r.is_active).collect();
    candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));

    let matched = candidates.into_iter().find(|r| r.matches(lead));

    let (base_price, surge, exclusive, rule_id) = match matched {
        Some(rule) => (
            rule.base_price,
            rule.surge_multiplier,
            rule.exclusive_multiplier,
            Some(rule.id),
        ),
        None => (
            *DEFAULT_BASE_PRICE,
            *DEFAULT_SURGE_MULTIPLIER,
            *DEFAULT_EXCLUSIVE_MULTIPLIER,
            None,
        ),
    };

    let mut price = base_price;
    if lead.is_exclusive {
        price *= exclusive;
    }
    if lead.timing == Some(LeadTiming::Asap) {
        price *= surge;
    }

    Quote {
        price: price.round_dp(2),
        rule_id,
    }
}

/// Clamp a resolved call price to the per-call bounds in the workspace
/// billing settings.
pub fn clamp_call_price(price: Decimal, settings: &BillingSettings) -> Decimal {
    let mut clamped = price;
    if let Some(max) = settings.max_price_per_call {
        clamped = clamped.min(max);
    }
    if let Some(min) = settings.min_price_per_call {
        clamped = clamped.max(min);
    }
    clamped
}

fn validate_rule(
    base_price: Decimal,
    surge_multiplier: Decimal,
    exclusive_multiplier: Decimal,
) -> Result<(), BillingError> {
    if base_price < Decimal::ZERO {
        return Err(BillingError::Validation(
            "base_price must not be negative".to_string(),
        ));
    }
    if surge_multiplier < Decimal::ONE || exclusive_multiplier < Decimal::ONE {
        return Err(BillingError::Validation(
            "multipliers must be at least 1.0".to_string(),
        ));
    }
    Ok(())
}

pub struct PricingService {
    db_pool: DbPool,
    redis: RedisClient,
}

impl PricingService {
    pub fn new(db_pool: DbPool, redis: RedisClient) -> Self {
        Self { db_pool, redis }
    }

    /// Active rules for a workspace in evaluation order, cached in Redis.
    pub async fn active_rules(&self, workspace_id: i64) -> Result<Vec<PricingRule>, BillingError> {
        let cache_key = CacheKeys::pricing_rules(workspace_id);
        if let Ok(Some(cached)) = self.redis.get(&cache_key).await {
            if let Ok(rules) = serde_json::from_str::<Vec<PricingRule>>(&cached) {
                return Ok(rules);
            }
        }

        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let rows = client
            .query(
                "SELECT id, workspace_id, name, service_id, region, city, postal_code,
                        timing, budget_min, budget_max, property_type, is_exclusive,
                        base_price, surge_multiplier, exclusive_multiplier, priority,
                        is_active, created_at
                 FROM lead_pricing_rules
                 WHERE workspace_id = $1 AND is_active = TRUE
                 ORDER BY priority DESC, id ASC",
                &[&workspace_id],
            )
            .await?;

        let rules: Vec<PricingRule> = rows.iter().map(row_to_rule).collect();

        if let Ok(json) = serde_json::to_string(&rules) {
            let _ = self.redis.set(&cache_key, &json, RULE_CACHE_TTL).await;
        }

        Ok(rules)
    }

    /// All rules for the admin listing, active or not.
    pub async fn list_rules(&self, workspace_id: i64) -> Result<Vec<PricingRule>, BillingError> {
        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let rows = client
            .query(
                "SELECT id, workspace_id, name, service_id, region, city, postal_code,
                        timing, budget_min, budget_max, property_type, is_exclusive,
                        base_price, surge_multiplier, exclusive_multiplier, priority,
                        is_active, created_at
                 FROM lead_pricing_rules
                 WHERE workspace_id = $1
                 ORDER BY priority DESC, id ASC",
                &[&workspace_id],
            )
            .await?;

        Ok(rows.iter().map(row_to_rule).collect())
    }

    /// Malformed rules are rejected here, at write time - resolution assumes
    /// pre-validated rules.
    pub async fn create_rule(
        &self,
        workspace_id: i64,
        req: &CreatePricingRuleRequest,
    ) -> Result<i64, BillingError> {
        let surge = req.surge_multiplier.unwrap_or(*DEFAULT_SURGE_MULTIPLIER);
        let exclusive = req.exclusive_multiplier.unwrap_or(*DEFAULT_EXCLUSIVE_MULTIPLIER);
        validate_rule(req.base_price, surge, exclusive)?;

        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let timing = req.timing.map(|t| t.as_str().to_string());
        let row = client
            .query_one(
                "INSERT INTO lead_pricing_rules
                 (workspace_id, name, service_id, region, city, postal_code, timing,
                  budget_min, budget_max, property_type, is_exclusive,
                  base_price, surge_multiplier, exclusive_multiplier, priority, is_active)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                 RETURNING id",
                &[
                    &workspace_id,
                    &req.name,
                    &req.service_id,
                    &req.region,
                    &req.city,
                    &req.postal_code,
                    &timing,
                    &req.budget_min,
                    &req.budget_max,
                    &req.property_type,
                    &req.is_exclusive,
                    &req.base_price,
                    &surge,
                    &exclusive,
                    &req.priority.unwrap_or(0),
                    &req.is_active.unwrap_or(true),
                ],
            )
            .await?;

        let rule_id: i64 = row.get(0);
        info!("Pricing rule {} created for workspace {}", rule_id, workspace_id);

        self.invalidate_rules(workspace_id).await;
        Ok(rule_id)
    }

    pub async fn update_rule(
        &self,
        workspace_id: i64,
        rule_id: i64,
        req: &CreatePricingRuleRequest,
    ) -> Result<(), BillingError> {
        let surge = req.surge_multiplier.unwrap_or(*DEFAULT_SURGE_MULTIPLIER);
        let exclusive = req.exclusive_multiplier.unwrap_or(*DEFAULT_EXCLUSIVE_MULTIPLIER);
        validate_rule(req.base_price, surge, exclusive)?;

        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let timing = req.timing.map(|t| t.as_str().to_string());
        let updated = client
            .execute(
                "UPDATE lead_pricing_rules
                 SET name = $3, service_id = $4, region = $5, city = $6, postal_code = $7,
                     timing = $8, budget_min = $9, budget_max = $10, property_type = $11,
                     is_exclusive = $12, base_price = $13, surge_multiplier = $14,
                     exclusive_multiplier = $15, priority = $16, is_active = $17
                 WHERE id = $1 AND workspace_id = $2",
                &[
                    &rule_id,
                    &workspace_id,
                    &req.name,
                    &req.service_id,
                    &req.region,
                    &req.city,
                    &req.postal_code,
                    &timing,
                    &req.budget_min,
                    &req.budget_max,
                    &req.property_type,
                    &req.is_exclusive,
                    &req.base_price,
                    &surge,
                    &exclusive,
                    &req.priority.unwrap_or(0),
                    &req.is_active.unwrap_or(true),
                ],
            )
            .await?;

        if updated == 0 {
            return Err(BillingError::NotFound("pricing rule"));
        }

        self.invalidate_rules(workspace_id).await;
        Ok(())
    }

    pub async fn delete_rule(&self, workspace_id: i64, rule_id: i64) -> Result<(), BillingError> {
        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let deleted = client
            .execute(
                "DELETE FROM lead_pricing_rules WHERE id = $1 AND workspace_id = $2",
                &[&rule_id, &workspace_id],
            )
            .await?;

        if deleted == 0 {
            return Err(BillingError::NotFound("pricing rule"));
        }

        self.invalidate_rules(workspace_id).await;
        Ok(())
    }

    /// Resolve a lead price against the workspace's active rules.
    pub async fn quote_lead(
        &self,
        workspace_id: i64,
        lead: &LeadAttributes,
    ) -> Result<Quote, BillingError> {
        let rules = self.active_rules(workspace_id).await?;
        Ok(resolve_price(lead, &rules))
    }

    /// Resolve a call price: rule resolution plus the per-call price clamp.
    pub async fn quote_call(
        &self,
        workspace_id: i64,
        attrs: &LeadAttributes,
    ) -> Result<Quote, BillingError> {
        let rules = self.active_rules(workspace_id).await?;
        let settings = self.get_settings(workspace_id).await?;

        let quote = resolve_price(attrs, &rules);
        Ok(Quote {
            price: clamp_call_price(quote.price, &settings),
            rule_id: quote.rule_id,
        })
    }

    pub async fn get_settings(&self, workspace_id: i64) -> Result<BillingSettings, BillingError> {
        let cache_key = CacheKeys::billing_settings(workspace_id);
        if let Ok(Some(cached)) = self.redis.get(&cache_key).await {
            if let Ok(settings) = serde_json::from_str::<BillingSettings>(&cached) {
                return Ok(settings);
            }
        }

        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let row = client
            .query_opt(
                "SELECT workspace_id, min_duration_seconds, auto_bill_enabled,
                        dispute_window_hours, min_price_per_call, max_price_per_call
                 FROM call_billing_settings
                 WHERE workspace_id = $1 AND is_active = TRUE
                 LIMIT 1",
                &[&workspace_id],
            )
            .await?;

        let settings = match row {
            Some(r) => BillingSettings {
                workspace_id: r.get(0),
                min_duration_seconds: r.get(1),
                auto_bill_enabled: r.get(2),
                dispute_window_hours: r.get(3),
                min_price_per_call: r.get(4),
                max_price_per_call: r.get(5),
            },
            None => BillingSettings::defaults(workspace_id),
        };

        if let Ok(json) = serde_json::to_string(&settings) {
            let _ = self.redis.set(&cache_key, &json, RULE_CACHE_TTL).await;
        }

        Ok(settings)
    }

    pub async fn update_settings(
        &self,
        workspace_id: i64,
        req: &UpdateBillingSettingsRequest,
    ) -> Result<BillingSettings, BillingError> {
        if let Some(min_duration) = req.min_duration_seconds {
            if min_duration < 0 {
                return Err(BillingError::Validation(
                    "min_duration_seconds must not be negative".to_string(),
                ));
            }
        }
        if let Some(window) = req.dispute_window_hours {
            if window <= 0 {
                return Err(BillingError::Validation(
                    "dispute_window_hours must be positive".to_string(),
                ));
            }
        }

        let current = self.get_settings(workspace_id).await?;
        let merged = BillingSettings {
            workspace_id,
            min_duration_seconds: req.min_duration_seconds.unwrap_or(current.min_duration_seconds),
            auto_bill_enabled: req.auto_bill_enabled.unwrap_or(current.auto_bill_enabled),
            dispute_window_hours: req.dispute_window_hours.unwrap_or(current.dispute_window_hours),
            min_price_per_call: req.min_price_per_call.or(current.min_price_per_call),
            max_price_per_call: req.max_price_per_call.or(current.max_price_per_call),
        };

        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        client
            .execute(
                "INSERT INTO call_billing_settings
                 (workspace_id, min_duration_seconds, auto_bill_enabled, dispute_window_hours,
                  min_price_per_call, max_price_per_call, is_active, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, TRUE, NOW())
                 ON CONFLICT (workspace_id)
                 DO UPDATE SET min_duration_seconds = $2, auto_bill_enabled = $3,
                               dispute_window_hours = $4, min_price_per_call = $5,
                               max_price_per_call = $6, updated_at = NOW()",
                &[
                    &workspace_id,
                    &merged.min_duration_seconds,
                    &merged.auto_bill_enabled,
                    &merged.dispute_window_hours,
                    &merged.min_price_per_call,
                    &merged.max_price_per_call,
                ],
            )
            .await?;

        let _ = self.redis.delete(&CacheKeys::billing_settings(workspace_id)).await;
        Ok(merged)
    }

    async fn invalidate_rules(&self, workspace_id: i64) {
        if let Err(e) = self.redis.delete(&CacheKeys::pricing_rules(workspace_id)).await {
            warn!("Failed to invalidate pricing rule cache for workspace {}: {}", workspace_id, e);
        }
    }
}

fn row_to_rule(row: &tokio_postgres::Row) -> PricingRule {
    let timing: Option<String> = row.get(7);
    let created_at: DateTime<Utc> = row.get(17);

    PricingRule {
        id: row.get(0),
        workspace_id: row.get(1),
        name: row.get(2),
        service_id: row.get(3),
        region: row.get(4),
        city: row.get(5),
        postal_code: row.get(6),
        timing: timing.as_deref().map(LeadTiming::from_str),
        budget_min: row.get(8),
        budget_max: row.get(9),
        property_type: row.get(10),
        is_exclusive: row.get(11),
        base_price: row.get(12),
        surge_multiplier: row.get(13),
        exclusive_multiplier: row.get(14),
        priority: row.get(15),
        is_active: row.get(16),
        created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use proptest::prelude::*;

    fn rule(id: i64, priority: i32) -> PricingRule {
        PricingRule {
            id,
            workspace_id: 1,
            name: None,
            service_id: None,
            region: None,
            city: None,
            postal_code: None,
            timing: None,
            budget_min: None,
            budget_max: None,
            property_type: None,
            is_exclusive: None,
            base_price: dec!(40.00),
            surge_multiplier: dec!(1.0),
            exclusive_multiplier: dec!(3.0),
            priority,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn lead() -> LeadAttributes {
        LeadAttributes {
            service_ids: vec![7],
            region: Some("CA".to_string()),
            timing: Some(LeadTiming::Flexible),
            ..Default::default()
        }
    }

    #[test]
    fn plain_lead_pays_base_price() {
        let rules = vec![rule(1, 10)];
        let quote = resolve_price(&lead(), &rules);
        assert_eq!(quote.price, dec!(40.00));
        assert_eq!(quote.rule_id, Some(1));
    }

    #[test]
    fn exclusive_asap_lead_compounds_multipliers() {
        let mut r = rule(1, 10);
        r.base_price = dec!(10.00);
        r.surge_multiplier = dec!(1.5);
        r.exclusive_multiplier = dec!(2.0);

        let mut l = lead();
        l.is_exclusive = true;
        l.timing = Some(LeadTiming::Asap);

        let quote = resolve_price(&l, &[r]);
        // 10 * 2.0 * 1.5
        assert_eq!(quote.price, dec!(30.00));
    }

    #[test]
    fn surge_only_applies_to_asap() {
        let mut r = rule(1, 10);
        r.base_price = dec!(10.00);
        r.surge_multiplier = dec!(2.0);

        let mut l = lead();
        l.timing = Some(LeadTiming::Within24h);

        assert_eq!(resolve_price(&l, &[r]).price, dec!(10.00));
    }

    #[test]
    fn no_match_falls_back_to_default() {
        let mut r = rule(1, 10);
        r.region = Some("CA".to_string());

        let mut l = lead();
        l.region = Some("TX".to_string());

        let quote = resolve_price(&l, &[r]);
        assert_eq!(quote.price, dec!(25.00));
        assert_eq!(quote.rule_id, None);
    }

    #[test]
    fn region_scoped_rule_beats_default() {
        let mut r = rule(1, 10);
        r.region = Some("CA".to_string());
        r.service_id = Some(7);

        let quote = resolve_price(&lead(), &[r]);
        assert_eq!(quote.price, dec!(40.00));
        assert_eq!(quote.rule_id, Some(1));
    }

    #[test]
    fn higher_priority_wins_then_lower_id() {
        let mut low = rule(1, 5);
        low.base_price = dec!(30.00);
        let mut high = rule(2, 10);
        high.base_price = dec!(50.00);

        let quote = resolve_price(&lead(), &[low.clone(), high.clone()]);
        assert_eq!(quote.rule_id, Some(2));
        assert_eq!(quote.price, dec!(50.00));

        // Equal priority: lower id first, regardless of slice order
        let mut a = rule(3, 10);
        a.base_price = dec!(60.00);
        let quote = resolve_price(&lead(), &[a, high]);
        assert_eq!(quote.rule_id, Some(2));
    }

    #[test]
    fn inactive_rules_are_skipped() {
        let mut r = rule(1, 10);
        r.is_active = false;
        let quote = resolve_price(&lead(), &[r]);
        assert_eq!(quote.rule_id, None);
    }

    #[test]
    fn budget_constraint_matches_on_overlap() {
        let mut r = rule(1, 10);
        r.budget_min = Some(dec!(100));
        r.budget_max = Some(dec!(500));

        let mut l = lead();
        l.budget_min = Some(dec!(400));
        l.budget_max = Some(dec!(800));
        assert_eq!(resolve_price(&l, &[r.clone()]).rule_id, Some(1));

        l.budget_min = Some(dec!(600));
        l.budget_max = Some(dec!(800));
        assert_eq!(resolve_price(&l, &[r.clone()]).rule_id, None);

        // A rule with a budget window never matches a lead without one
        l.budget_min = None;
        l.budget_max = None;
        assert_eq!(resolve_price(&l, &[r]).rule_id, None);
    }

    #[test]
    fn exclusive_rule_requires_exclusive_lead() {
        let mut r = rule(1, 10);
        r.is_exclusive = Some(true);

        assert_eq!(resolve_price(&lead(), &[r.clone()]).rule_id, None);

        let mut l = lead();
        l.is_exclusive = true;
        assert_eq!(resolve_price(&l, &[r]).rule_id, Some(1));
    }

    #[test]
    fn clamp_respects_settings_bounds() {
        let mut settings = BillingSettings::defaults(1);
        settings.min_price_per_call = Some(dec!(5.00));
        settings.max_price_per_call = Some(dec!(100.00));

        assert_eq!(clamp_call_price(dec!(2.00), &settings), dec!(5.00));
        assert_eq!(clamp_call_price(dec!(250.00), &settings), dec!(100.00));
        assert_eq!(clamp_call_price(dec!(42.00), &settings), dec!(42.00));
    }

    proptest! {
        #[test]
        fn resolution_is_deterministic(
            priorities in proptest::collection::vec(0i32..20, 1..10),
            exclusive in any::<bool>(),
        ) {
            let rules: Vec<PricingRule> = priorities
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let mut r = rule(i as i64 + 1, *p);
                    r.base_price = Decimal::from(10 + i as i64);
                    r
                })
                .collect();

            let mut l = lead();
            l.is_exclusive = exclusive;

            let first = resolve_price(&l, &rules);
            let second = resolve_price(&l, &rules);
            prop_assert_eq!(first.price, second.price);
            prop_assert_eq!(first.rule_id, second.rule_id);
        }

        #[test]
        fn winner_has_max_priority_min_id(
            priorities in proptest::collection::vec(0i32..5, 1..10),
        ) {
            let rules: Vec<PricingRule> = priorities
                .iter()
                .enumerate()
                .map(|(i, p)| rule(i as i64 + 1, *p))
                .collect();

            let quote = resolve_price(&lead(), &rules);
            let winner_id = quote.rule_id.unwrap();
            let winner = rules.iter().find(|r| r.id == winner_id).unwrap();

            for r in &rules {
                prop_assert!(r.priority <= winner.priority);
                if r.priority == winner.priority {
                    prop_assert!(winner.id <= r.id);
                }
            }
        }
    }
}
