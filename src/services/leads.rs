// src/services/leads.rs

use crate::models::{
    LeadRequest, LeadStatus, LeadMatch, MatchStatus, LeadAttributes, LeadTiming,
    CreateLeadRequest, CreateLeadResponse,
};
use crate::database::DbPool;
use crate::cache::{RedisClient, CacheKeys};
use crate::services::PricingService;
use crate::error::BillingError;
use std::sync::Arc;
use serde::Serialize;
use chrono::{DateTime, Utc};
use tokio_postgres::GenericClient;
use tracing::{info, warn};

const INTAKE_GUARD_TTL: usize = 60;
const DEDUPE_WINDOW_HOURS: i32 = 24;

const SPAM_KEYWORDS: &[&str] = &[
    "viagra", "casino", "crypto", "loan", "porn", "sex", "escort", "bitcoin", "betting",
];

#[derive(Debug, Clone, Serialize)]
pub struct QualityAssessment {
    pub score: f64,
    pub is_spam: bool,
    pub reasons: Vec<String>,
}

/// Heuristic lead quality score, 0-100. Contact completeness earns points,
/// spam markers subtract; anything below 20 is treated as spam and never
/// routed.
pub fn score_lead_quality(req: &CreateLeadRequest) -> QualityAssessment {
    let mut score = 0.0f64;
    let mut reasons = Vec::new();

    let name = req.consumer_name.as_deref().unwrap_or("").trim();
    let email = req.consumer_email.as_deref().unwrap_or("").trim();
    let phone = req.consumer_phone.as_deref().unwrap_or("").trim();
    let postal = req.postal_code.as_deref().unwrap_or("").trim();
    let title = req.title.as_deref().unwrap_or("").trim();
    let description = req.description.as_deref().unwrap_or("").trim();

    if !phone.is_empty() {
        score += 30.0;
    }
    if !email.is_empty() {
        score += 30.0;
    }
    if !name.is_empty() {
        score += 10.0;
    }
    if !postal.is_empty() {
        score += 10.0;
    }
    if !title.is_empty() {
        score += 5.0;
    }
    if description.len() >= 20 {
        score += 10.0;
    }
    if req.budget_min.is_some() || req.budget_max.is_some() {
        score += 5.0;
    }

    let text = format!("{} {}", title, description).to_lowercase();

    for keyword in SPAM_KEYWORDS {
        if text.contains(keyword) {
            reasons.push(format!("keyword:{}", keyword));
            score -= 40.0;
            break;
        }
    }

    let url_count = text.matches("http://").count() + text.matches("https://").count();
    if url_count >= 2 {
        reasons.push("many_urls".to_string());
        score -= 25.0;
    }

    let throwaway_name = name
        .to_lowercase()
        .split_whitespace()
        .any(|word| matches!(word, "test" | "asdf" | "qwer"));
    if throwaway_name {
        reasons.push("test_name".to_string());
        score -= 20.0;
    }

    let score = score.clamp(0.0, 100.0);

    QualityAssessment {
        score,
        is_spam: score < 20.0,
        reasons,
    }
}

fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        _ => false,
    }
}

#[derive(Debug, Serialize)]
pub struct LeadDetail {
    #[serde(flatten)]
    pub lead: LeadRequest,
    pub service_ids: Vec<i64>,
    pub matches: Vec<LeadMatch>,
}

pub struct LeadService {
    db_pool: DbPool,
    redis: RedisClient,
    pricing: Arc<PricingService>,
}

impl LeadService {
    pub fn new(db_pool: DbPool, redis: RedisClient, pricing: Arc<PricingService>) -> Self {
        Self {
            db_pool,
            redis,
            pricing,
        }
    }

    /// Lead intake: validate, dedupe against the 24h window, score quality,
    /// price via the rule resolver, persist atomically and queue for routing.
    pub async fn create_lead(
        &self,
        workspace_id: i64,
        req: &CreateLeadRequest,
    ) -> Result<CreateLeadResponse, BillingError> {
        let name = req.consumer_name.as_deref().unwrap_or("").trim();
        let phone = req.consumer_phone.as_deref().unwrap_or("").trim().to_string();
        let email = req
            .consumer_email
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_lowercase();

        if name.is_empty() && phone.is_empty() && email.is_empty() {
            return Err(BillingError::Validation(
                "at least one contact method required".to_string(),
            ));
        }
        if req.services.is_empty() {
            return Err(BillingError::Validation(
                "at least one service required".to_string(),
            ));
        }
        if !email.is_empty() && !is_valid_email(&email) {
            return Err(BillingError::Validation("invalid email format".to_string()));
        }

        // Short Redis guard against double submits racing the DB check.
        let guard_contact = if !phone.is_empty() { &phone } else { &email };
        let mut guard_held = false;
        if !guard_contact.is_empty() {
            let guard_key = CacheKeys::lead_intake(workspace_id, guard_contact);
            guard_held = self.redis.setnx_ex(&guard_key, "1", INTAKE_GUARD_TTL).await
                .unwrap_or(true);
        }

        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        // NULL (not '') for missing contacts, so the dedupe comparisons
        // cannot match across leads that share an empty field.
        let phone_opt = (!phone.is_empty()).then_some(phone.as_str());
        let email_opt = (!email.is_empty()).then_some(email.as_str());

        if phone_opt.is_some() || email_opt.is_some() {
            let existing = client
                .query_opt(
                    "SELECT id FROM lead_requests
                     WHERE workspace_id = $1
                       AND (consumer_phone = $2 OR consumer_email = $3)
                       AND created_at > NOW() - make_interval(hours => $4)
                       AND status NOT IN ('closed', 'expired', 'spam', 'duplicate')
                     LIMIT 1",
                    &[&workspace_id, &phone_opt, &email_opt, &DEDUPE_WINDOW_HOURS],
                )
                .await?;

            if let Some(row) = existing {
                return Err(BillingError::DuplicateLead {
                    existing_id: row.get(0),
                });
            }
            if !guard_held {
                return Err(BillingError::Validation(
                    "duplicate submission in progress".to_string(),
                ));
            }
        }

        let timing = req.timing.unwrap_or(LeadTiming::Flexible);
        let attrs = LeadAttributes {
            service_ids: req.services.clone(),
            region: req.region.clone(),
            city: req.city.clone(),
            postal_code: req.postal_code.clone(),
            timing: Some(timing),
            budget_min: req.budget_min,
            budget_max: req.budget_max,
            property_type: req.property_type.clone(),
            is_exclusive: req.is_exclusive,
        };
        let quote = self.pricing.quote_lead(workspace_id, &attrs).await?;

        let quality = score_lead_quality(req);
        let status = if quality.is_spam {
            LeadStatus::Spam
        } else {
            LeadStatus::New
        };

        // Exclusive leads are sold exactly once.
        let mut max_sold = req.max_sold_count.unwrap_or(3).max(1);
        if req.is_exclusive {
            max_sold = 1;
        }

        let mut client = client;
        let tx = client.transaction().await?;

        let source = req.source.as_deref().unwrap_or("form");
        let country = req.country.as_deref().unwrap_or("US");
        let row = tx
            .query_one(
                "INSERT INTO lead_requests
                 (workspace_id, source, consumer_name, consumer_email, consumer_phone,
                  city, region, country, postal_code, latitude, longitude,
                  budget_min, budget_max, timing, title, description, property_type,
                  is_exclusive, max_sold_count, current_sold_count,
                  lead_price_base, lead_price_final, quality_score, status)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                         $15, $16, $17, $18, $19, 0, $20, $20, $21, $22)
                 RETURNING id",
                &[
                    &workspace_id,
                    &source,
                    &req.consumer_name,
                    &email_opt,
                    &phone_opt,
                    &req.city,
                    &req.region,
                    &country,
                    &req.postal_code,
                    &req.latitude,
                    &req.longitude,
                    &req.budget_min,
                    &req.budget_max,
                    &timing.as_str(),
                    &req.title,
                    &req.description,
                    &req.property_type,
                    &req.is_exclusive,
                    &max_sold,
                    &quote.price,
                    &quality.score,
                    &status.as_str(),
                ],
            )
            .await?;
        let lead_id: i64 = row.get(0);

        for service_id in &req.services {
            tx.execute(
                "INSERT INTO lead_request_services (workspace_id, lead_request_id, service_id, quantity)
                 VALUES ($1, $2, $3, 1)",
                &[&workspace_id, &lead_id, service_id],
            )
            .await?;
        }

        // Spam is stored for review but never queued for routing.
        if status != LeadStatus::Spam {
            tx.execute(
                "INSERT INTO lead_routing_queue (workspace_id, lead_request_id, status)
                 VALUES ($1, $2, 'pending')",
                &[&workspace_id, &lead_id],
            )
            .await?;
        }

        log_activity(
            &*tx,
            workspace_id,
            Some(lead_id),
            None,
            None,
            "lead_created",
            "Lead request created",
        )
        .await;

        tx.commit().await?;

        info!(
            "Lead {} created (price ${}, quality {}, status {})",
            lead_id,
            quote.price,
            quality.score,
            status.as_str()
        );

        Ok(CreateLeadResponse {
            id: lead_id,
            lead_price: quote.price,
            quality_score: quality.score,
            status,
        })
    }

    pub async fn get_lead(
        &self,
        workspace_id: i64,
        lead_id: i64,
    ) -> Result<LeadDetail, BillingError> {
        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let sql = format!("{} WHERE id = $1 AND workspace_id = $2", LEAD_SELECT);
        let row = client
            .query_opt(sql.as_str(), &[&lead_id, &workspace_id])
            .await?
            .ok_or(BillingError::NotFound("lead"))?;
        let lead = row_to_lead(&row);

        let service_rows = client
            .query(
                "SELECT service_id FROM lead_request_services
                 WHERE workspace_id = $1 AND lead_request_id = $2",
                &[&workspace_id, &lead_id],
            )
            .await?;
        let service_ids = service_rows.iter().map(|r| r.get(0)).collect();

        let sql = format!(
            "{} WHERE workspace_id = $1 AND lead_request_id = $2 ORDER BY id ASC",
            MATCH_SELECT
        );
        let match_rows = client.query(sql.as_str(), &[&workspace_id, &lead_id]).await?;
        let matches = match_rows.iter().map(row_to_match).collect();

        Ok(LeadDetail {
            lead,
            service_ids,
            matches,
        })
    }

    pub async fn list_leads(
        &self,
        workspace_id: i64,
        status: Option<LeadStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LeadRequest>, BillingError> {
        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let limit = limit.clamp(1, 100);

        let rows = match status {
            Some(s) => {
                let sql = format!(
                    "{} WHERE workspace_id = $1 AND status = $2
                     ORDER BY created_at DESC LIMIT $3 OFFSET $4",
                    LEAD_SELECT
                );
                client
                    .query(sql.as_str(), &[&workspace_id, &s.as_str(), &limit, &offset])
                    .await?
            }
            None => {
                let sql = format!(
                    "{} WHERE workspace_id = $1
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3",
                    LEAD_SELECT
                );
                client
                    .query(sql.as_str(), &[&workspace_id, &limit, &offset])
                    .await?
            }
        };

        Ok(rows.iter().map(row_to_lead).collect())
    }
}

/// Best-effort lifecycle audit trail. A failed log entry must never mask the
/// operation that triggered it.
pub(crate) async fn log_activity<C: GenericClient>(
    client: &C,
    workspace_id: i64,
    lead_request_id: Option<i64>,
    lead_match_id: Option<i64>,
    company_id: Option<i64>,
    activity_type: &str,
    description: &str,
) {
    let result = client
        .execute(
            "INSERT INTO lead_activity_log
             (workspace_id, lead_request_id, lead_match_id, company_id, activity_type, description)
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &workspace_id,
                &lead_request_id,
                &lead_match_id,
                &company_id,
                &activity_type,
                &description,
            ],
        )
        .await;

    if let Err(e) = result {
        warn!("Failed to record activity {}: {}", activity_type, e);
    }
}

pub(crate) const LEAD_SELECT: &str =
    "SELECT id, workspace_id, source, consumer_name, consumer_email, consumer_phone,
            city, region, country, postal_code, latitude, longitude, budget_min,
            budget_max, timing, title, description, property_type, is_exclusive,
            max_sold_count, current_sold_count, lead_price_final, quality_score,
            status, created_at, expires_at
     FROM lead_requests";

pub(crate) fn row_to_lead(row: &tokio_postgres::Row) -> LeadRequest {
    let timing: String = row.get(14);
    let status: String = row.get(23);
    let created_at: DateTime<Utc> = row.get(24);

    LeadRequest {
        id: row.get(0),
        workspace_id: row.get(1),
        source: row.get(2),
        consumer_name: row.get(3),
        consumer_email: row.get(4),
        consumer_phone: row.get(5),
        city: row.get(6),
        region: row.get(7),
        country: row.get(8),
        postal_code: row.get(9),
        latitude: row.get(10),
        longitude: row.get(11),
        budget_min: row.get(12),
        budget_max: row.get(13),
        timing: LeadTiming::from_str(&timing),
        title: row.get(15),
        description: row.get(16),
        property_type: row.get(17),
        is_exclusive: row.get(18),
        max_sold_count: row.get(19),
        current_sold_count: row.get(20),
        lead_price_final: row.get(21),
        quality_score: row.get(22),
        status: LeadStatus::from_str(&status),
        created_at,
        expires_at: row.get(25),
    }
}

pub(crate) const MATCH_SELECT: &str =
    "SELECT id, workspace_id, lead_request_id, company_id, pro_id, distance_km,
            lead_price, status, offered_at, viewed_at, accepted_at, expires_at,
            response_time_minutes, won_value, lost_reason, credit_transaction_id,
            refund_transaction_id
     FROM lead_matches";

pub(crate) fn row_to_match(row: &tokio_postgres::Row) -> LeadMatch {
    let status: String = row.get(7);
    let offered_at: DateTime<Utc> = row.get(8);

    LeadMatch {
        id: row.get(0),
        workspace_id: row.get(1),
        lead_request_id: row.get(2),
        company_id: row.get(3),
        pro_id: row.get(4),
        distance_km: row.get(5),
        lead_price: row.get(6),
        status: MatchStatus::from_str(&status),
        offered_at,
        viewed_at: row.get(9),
        accepted_at: row.get(10),
        expires_at: row.get(11),
        response_time_minutes: row.get(12),
        won_value: row.get(13),
        lost_reason: row.get(14),
        credit_transaction_id: row.get(15),
        refund_transaction_id: row.get(16),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_request() -> CreateLeadRequest {
        CreateLeadRequest {
            source: None,
            consumer_name: Some("Jane Doe".to_string()),
            consumer_email: Some("jane@example.com".to_string()),
            consumer_phone: Some("+14155550123".to_string()),
            city: None,
            region: None,
            country: None,
            postal_code: Some("94107".to_string()),
            latitude: None,
            longitude: None,
            budget_min: Some(dec!(100)),
            budget_max: Some(dec!(500)),
            timing: None,
            title: Some("Kitchen remodel".to_string()),
            description: Some("Full kitchen remodel, cabinets and counters".to_string()),
            property_type: None,
            is_exclusive: false,
            max_sold_count: None,
            services: vec![1],
        }
    }

    #[test]
    fn complete_lead_scores_high() {
        let quality = score_lead_quality(&base_request());
        assert_eq!(quality.score, 100.0);
        assert!(!quality.is_spam);
        assert!(quality.reasons.is_empty());
    }

    #[test]
    fn spam_keyword_flags_lead() {
        let mut req = base_request();
        req.consumer_email = None;
        req.consumer_phone = None;
        req.budget_min = None;
        req.budget_max = None;
        req.postal_code = None;
        req.description = Some("best casino bonus click now".to_string());

        let quality = score_lead_quality(&req);
        assert!(quality.is_spam);
        assert!(quality.reasons.iter().any(|r| r.starts_with("keyword:")));
    }

    #[test]
    fn throwaway_name_is_penalized() {
        let mut req = base_request();
        req.consumer_name = Some("test".to_string());

        let quality = score_lead_quality(&req);
        assert!(quality.reasons.contains(&"test_name".to_string()));
        assert_eq!(quality.score, 80.0);
    }

    #[test]
    fn repeated_urls_are_penalized() {
        let mut req = base_request();
        req.description =
            Some("see https://a.example.com and https://b.example.com for details".to_string());

        let quality = score_lead_quality(&req);
        assert!(quality.reasons.contains(&"many_urls".to_string()));
    }

    #[test]
    fn email_validation_accepts_plain_addresses() {
        assert!(is_valid_email("jane@example.com"));
        assert!(is_valid_email("j.doe+tag@mail.example.co"));
        assert!(!is_valid_email("jane@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("jane@nodot"));
        assert!(!is_valid_email("two@at@signs.com"));
        assert!(!is_valid_email("space in@example.com"));
    }
}
