// src/services/routing.rs

use crate::models::{
    LeadStatus, LeadMatch, MatchStatus, TxnRefs, SendQuoteRequest, MarkOutcomeRequest,
    RefundLeadRequest, RouteLeadResponse,
};
use crate::database::DbPool;
use crate::services::WalletLedger;
use crate::services::leads::{log_activity, row_to_lead, row_to_match, LEAD_SELECT, MATCH_SELECT};
use crate::error::BillingError;
use std::cmp::Ordering;
use std::sync::Arc;
use serde::Serialize;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use chrono::Utc;
use tracing::{info, warn};

const OFFER_WINDOW_HOURS: i64 = 24;

pub(crate) fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let earth_radius = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    earth_radius * 2.0 * a.sqrt().asin()
}

/// Ranking for eligible providers: closer, better funded, less restrictive
/// providers first.
fn score_candidate(distance_km: Option<f64>, balance: Decimal, min_budget: Decimal) -> f64 {
    let mut score = match distance_km {
        Some(d) => (50.0 - d * 2.0).max(0.0),
        None => 10.0,
    };
    score += balance.to_f64().unwrap_or(0.0).min(30.0);
    score += (20.0 - min_budget.to_f64().unwrap_or(0.0) / 100.0).max(0.0);
    score
}

#[derive(Debug, Serialize)]
pub struct AcceptOutcome {
    pub balance_after: Decimal,
    pub sold_count: i32,
    pub max_sold_count: i32,
    pub lead_status: LeadStatus,
}

struct Candidate {
    company_id: i64,
    pro_id: i64,
    distance_km: Option<f64>,
    score: f64,
}

/// Offers leads to eligible providers and handles the provider side of a
/// match: view, accept (wallet debit), decline, quote, outcome, refund.
pub struct LeadRouter {
    db_pool: DbPool,
    ledger: Arc<WalletLedger>,
}

impl LeadRouter {
    pub fn new(db_pool: DbPool, ledger: Arc<WalletLedger>) -> Self {
        Self { db_pool, ledger }
    }

    /// Fan a lead out to the best eligible providers, up to its sale cap.
    pub async fn route_lead(
        &self,
        workspace_id: i64,
        lead_id: i64,
    ) -> Result<RouteLeadResponse, BillingError> {
        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let sql = format!("{} WHERE id = $1 AND workspace_id = $2", LEAD_SELECT);
        let row = client
            .query_opt(sql.as_str(), &[&lead_id, &workspace_id])
            .await?
            .ok_or(BillingError::NotFound("lead"))?;
        let lead = row_to_lead(&row);

        if !lead.status.is_routable() {
            return Err(BillingError::InvalidTransition(format!(
                "lead {} is {}, already routed or closed",
                lead_id,
                lead.status.as_str()
            )));
        }

        client
            .execute(
                "UPDATE lead_requests SET status = 'routing' WHERE id = $1 AND workspace_id = $2",
                &[&lead_id, &workspace_id],
            )
            .await?;

        let service_rows = client
            .query(
                "SELECT service_id FROM lead_request_services
                 WHERE workspace_id = $1 AND lead_request_id = $2",
                &[&workspace_id, &lead_id],
            )
            .await?;
        let service_ids: Vec<i64> = service_rows.iter().map(|r| r.get(0)).collect();
        if service_ids.is_empty() {
            return Err(BillingError::Validation(
                "lead has no services to route on".to_string(),
            ));
        }

        let candidate_rows = client
            .query(
                "SELECT DISTINCT sp.company_id, sp.id,
                        COALESCE(pp.min_budget, 0), COALESCE(pp.pause_when_balance_zero, FALSE),
                        COALESCE(cw.balance, 0)
                 FROM service_pros sp
                 JOIN service_pro_offerings spo
                   ON spo.company_id = sp.company_id
                  AND spo.workspace_id = sp.workspace_id
                  AND spo.is_active = TRUE
                  AND spo.service_id = ANY($2)
                 LEFT JOIN pro_preferences pp
                   ON pp.company_id = sp.company_id AND pp.workspace_id = sp.workspace_id
                 LEFT JOIN credits_wallets cw
                   ON cw.company_id = sp.company_id AND cw.workspace_id = sp.workspace_id
                 WHERE sp.workspace_id = $1 AND sp.status = 'active'",
                &[&workspace_id, &service_ids],
            )
            .await?;

        let lead_price = lead.lead_price_final;
        let mut eligible: Vec<Candidate> = Vec::new();

        for row in &candidate_rows {
            let company_id: i64 = row.get(0);
            let pro_id: i64 = row.get(1);
            let min_budget: Decimal = row.get(2);
            let pause_when_balance_zero: bool = row.get(3);
            let balance: Decimal = row.get(4);

            if let Some(budget_max) = lead.budget_max {
                if min_budget > Decimal::ZERO && budget_max < min_budget {
                    continue;
                }
            }
            if pause_when_balance_zero && balance < lead_price {
                continue;
            }

            // Geo filter against the provider's declared service areas.
            let mut distance_km = None;
            if let (Some(lead_lat), Some(lead_lng)) = (lead.latitude, lead.longitude) {
                let areas = client
                    .query(
                        "SELECT latitude, longitude, radius_km FROM service_areas
                         WHERE company_id = $1 AND workspace_id = $2 AND latitude IS NOT NULL",
                        &[&company_id, &workspace_id],
                    )
                    .await?;

                let mut in_range = false;
                for area in &areas {
                    let lat: f64 = area.get(0);
                    let lng: f64 = area.get(1);
                    let radius: f64 = area.get(2);
                    let d = haversine_km(lead_lat, lead_lng, lat, lng);
                    if d <= radius {
                        in_range = true;
                        distance_km = Some(d);
                        break;
                    }
                }
                if !in_range && !areas.is_empty() {
                    continue;
                }
            }

            let already = client
                .query_opt(
                    "SELECT id FROM lead_matches
                     WHERE workspace_id = $1 AND lead_request_id = $2 AND company_id = $3
                     LIMIT 1",
                    &[&workspace_id, &lead_id, &company_id],
                )
                .await?;
            if already.is_some() {
                continue;
            }

            eligible.push(Candidate {
                company_id,
                pro_id,
                distance_km,
                score: score_candidate(distance_km, balance, min_budget),
            });
        }

        eligible.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        let capacity = (lead.max_sold_count - lead.current_sold_count).max(0) as usize;
        eligible.truncate(capacity);

        let expires_at = Utc::now() + chrono::Duration::hours(OFFER_WINDOW_HOURS);
        let mut matches_created = 0usize;

        for candidate in &eligible {
            let inserted = client
                .query_one(
                    "INSERT INTO lead_matches
                     (workspace_id, lead_request_id, company_id, pro_id, distance_km,
                      lead_price, status, expires_at)
                     VALUES ($1, $2, $3, $4, $5, $6, 'offered', $7)
                     RETURNING id",
                    &[
                        &workspace_id,
                        &lead_id,
                        &candidate.company_id,
                        &candidate.pro_id,
                        &candidate.distance_km,
                        &lead_price,
                        &expires_at,
                    ],
                )
                .await?;
            let match_id: i64 = inserted.get(0);
            matches_created += 1;

            log_activity(
                &**client,
                workspace_id,
                Some(lead_id),
                Some(match_id),
                Some(candidate.company_id),
                "lead_offered",
                "Lead offered",
            )
            .await;
        }

        let status = if matches_created > 0 {
            LeadStatus::Routed
        } else {
            warn!("Lead {} had no eligible providers", lead_id);
            LeadStatus::Closed
        };
        client
            .execute(
                "UPDATE lead_requests
                 SET status = $1, routed_at = NOW(), expires_at = $2
                 WHERE id = $3 AND workspace_id = $4",
                &[&status.as_str(), &expires_at, &lead_id, &workspace_id],
            )
            .await?;

        info!(
            "Lead {} routed to {} providers ({})",
            lead_id,
            matches_created,
            status.as_str()
        );

        Ok(RouteLeadResponse {
            matches_created,
            status,
        })
    }

    /// Accept an offered match: debit the wallet and claim one sale slot,
    /// atomically. A failed charge leaves the match and lead untouched.
    pub async fn accept_match(
        &self,
        workspace_id: i64,
        company_id: i64,
        match_id: i64,
    ) -> Result<AcceptOutcome, BillingError> {
        let mut client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;
        let tx = client.transaction().await?;

        let sql = format!(
            "{} WHERE id = $1 AND workspace_id = $2 AND company_id = $3 FOR UPDATE",
            MATCH_SELECT
        );
        let row = tx
            .query_opt(sql.as_str(), &[&match_id, &workspace_id, &company_id])
            .await?
            .ok_or(BillingError::NotFound("lead match"))?;
        let lead_match = row_to_match(&row);

        if !lead_match.status.is_open() {
            return Err(BillingError::InvalidTransition(format!(
                "match {} is {}, cannot accept",
                match_id,
                lead_match.status.as_str()
            )));
        }

        if let Some(expires_at) = lead_match.expires_at {
            if expires_at < Utc::now() {
                tx.execute(
                    "UPDATE lead_matches SET status = 'expired' WHERE id = $1 AND workspace_id = $2",
                    &[&match_id, &workspace_id],
                )
                .await?;
                tx.commit().await?;
                return Err(BillingError::InvalidTransition(format!(
                    "match {} offer has expired",
                    match_id
                )));
            }
        }

        let sql = format!("{} WHERE id = $1 AND workspace_id = $2 FOR UPDATE", LEAD_SELECT);
        let lead_row = tx
            .query_opt(sql.as_str(), &[&lead_match.lead_request_id, &workspace_id])
            .await?
            .ok_or(BillingError::NotFound("lead"))?;
        let lead = row_to_lead(&lead_row);

        if lead.is_sold_out() {
            return Err(BillingError::InvalidTransition(format!(
                "lead {} is already sold out",
                lead.id
            )));
        }

        let refs = TxnRefs {
            lead_match_id: Some(match_id),
            lead_request_id: Some(lead.id),
            call_log_id: None,
        };
        let charge = self
            .ledger
            .charge_in_tx(
                &tx,
                workspace_id,
                company_id,
                lead_match.lead_price,
                &format!("Lead accepted (match #{})", match_id),
                refs,
            )
            .await?;

        let response_time_minutes =
            ((Utc::now() - lead_match.offered_at).num_seconds() as f64 / 60.0).round() as i32;

        tx.execute(
            "UPDATE lead_matches
             SET status = 'accepted', accepted_at = NOW(), credit_transaction_id = $1,
                 response_time_minutes = $2
             WHERE id = $3 AND workspace_id = $4",
            &[&charge.transaction_id, &response_time_minutes, &match_id, &workspace_id],
        )
        .await?;

        let sold_count = lead.current_sold_count + 1;
        let lead_status = if sold_count >= lead.max_sold_count {
            LeadStatus::Closed
        } else {
            LeadStatus::Partial
        };
        tx.execute(
            "UPDATE lead_requests
             SET current_sold_count = $1, status = $2,
                 closed_at = CASE WHEN $2 = 'closed' THEN NOW() ELSE closed_at END
             WHERE id = $3 AND workspace_id = $4",
            &[&sold_count, &lead_status.as_str(), &lead.id, &workspace_id],
        )
        .await?;

        // Sold out: retract the remaining open offers.
        if sold_count >= lead.max_sold_count {
            tx.execute(
                "UPDATE lead_matches SET status = 'expired'
                 WHERE workspace_id = $1 AND lead_request_id = $2 AND id <> $3
                   AND status IN ('offered', 'viewed')",
                &[&workspace_id, &lead.id, &match_id],
            )
            .await?;
        }

        tx.execute(
            "UPDATE service_pros SET total_leads_accepted = total_leads_accepted + 1
             WHERE company_id = $1 AND workspace_id = $2",
            &[&company_id, &workspace_id],
        )
        .await?;

        log_activity(
            &*tx,
            workspace_id,
            Some(lead.id),
            Some(match_id),
            Some(company_id),
            "lead_accepted",
            "Lead accepted",
        )
        .await;

        tx.commit().await?;

        info!(
            "Match {} accepted by company {} for ${} (lead {} now {}/{})",
            match_id, company_id, lead_match.lead_price, lead.id, sold_count, lead.max_sold_count
        );

        Ok(AcceptOutcome {
            balance_after: charge.balance_after,
            sold_count,
            max_sold_count: lead.max_sold_count,
            lead_status,
        })
    }

    pub async fn decline_match(
        &self,
        workspace_id: i64,
        company_id: i64,
        match_id: i64,
        reason: Option<&str>,
    ) -> Result<(), BillingError> {
        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let lead_match = self.load_match(&client, workspace_id, company_id, match_id).await?;
        if !lead_match.status.is_open() {
            return Err(BillingError::InvalidTransition(format!(
                "match {} is {}, cannot decline",
                match_id,
                lead_match.status.as_str()
            )));
        }

        client
            .execute(
                "UPDATE lead_matches
                 SET status = 'declined', declined_at = NOW(), declined_reason = $1
                 WHERE id = $2 AND workspace_id = $3",
                &[&reason, &match_id, &workspace_id],
            )
            .await?;

        log_activity(
            &**client,
            workspace_id,
            Some(lead_match.lead_request_id),
            Some(match_id),
            Some(company_id),
            "lead_declined",
            "Lead declined",
        )
        .await;

        Ok(())
    }

    /// Fetch a match for the provider; the first view of an offer marks it
    /// viewed.
    pub async fn get_match(
        &self,
        workspace_id: i64,
        company_id: i64,
        match_id: i64,
    ) -> Result<LeadMatch, BillingError> {
        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let mut lead_match = self.load_match(&client, workspace_id, company_id, match_id).await?;

        if lead_match.status == MatchStatus::Offered && lead_match.viewed_at.is_none() {
            client
                .execute(
                    "UPDATE lead_matches SET status = 'viewed', viewed_at = NOW()
                     WHERE id = $1 AND workspace_id = $2",
                    &[&match_id, &workspace_id],
                )
                .await?;
            lead_match.status = MatchStatus::Viewed;

            log_activity(
                &**client,
                workspace_id,
                Some(lead_match.lead_request_id),
                Some(match_id),
                Some(company_id),
                "lead_viewed",
                "Lead viewed",
            )
            .await;
        }

        Ok(lead_match)
    }

    pub async fn list_matches(
        &self,
        workspace_id: i64,
        company_id: i64,
        status: Option<MatchStatus>,
        limit: i64,
    ) -> Result<Vec<LeadMatch>, BillingError> {
        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let limit = limit.clamp(1, 100);

        let rows = match status {
            Some(s) => {
                let sql = format!(
                    "{} WHERE workspace_id = $1 AND company_id = $2 AND status = $3
                     ORDER BY offered_at DESC LIMIT $4",
                    MATCH_SELECT
                );
                client
                    .query(sql.as_str(), &[&workspace_id, &company_id, &s.as_str(), &limit])
                    .await?
            }
            None => {
                let sql = format!(
                    "{} WHERE workspace_id = $1 AND company_id = $2
                     ORDER BY offered_at DESC LIMIT $3",
                    MATCH_SELECT
                );
                client
                    .query(sql.as_str(), &[&workspace_id, &company_id, &limit])
                    .await?
            }
        };

        Ok(rows.iter().map(row_to_match).collect())
    }

    pub async fn send_quote(
        &self,
        workspace_id: i64,
        company_id: i64,
        match_id: i64,
        req: &SendQuoteRequest,
    ) -> Result<i64, BillingError> {
        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let lead_match = self.load_match(&client, workspace_id, company_id, match_id).await?;

        let quote_type = req.quote_type.as_deref().unwrap_or("quote");
        let row = client
            .query_one(
                "INSERT INTO lead_quotes
                 (workspace_id, lead_match_id, lead_request_id, company_id, quote_type,
                  message, price_min, price_max, eta)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 RETURNING id",
                &[
                    &workspace_id,
                    &match_id,
                    &lead_match.lead_request_id,
                    &company_id,
                    &quote_type,
                    &req.message,
                    &req.price_min,
                    &req.price_max,
                    &req.eta,
                ],
            )
            .await?;
        let quote_id: i64 = row.get(0);

        log_activity(
            &**client,
            workspace_id,
            Some(lead_match.lead_request_id),
            Some(match_id),
            Some(company_id),
            "quote_sent",
            "Quote sent",
        )
        .await;

        Ok(quote_id)
    }

    /// Terminal provider-reported outcome for an accepted lead.
    pub async fn mark_outcome(
        &self,
        workspace_id: i64,
        company_id: i64,
        match_id: i64,
        req: &MarkOutcomeRequest,
    ) -> Result<(), BillingError> {
        if req.outcome != "won" && req.outcome != "lost" {
            return Err(BillingError::Validation(
                "outcome must be won or lost".to_string(),
            ));
        }

        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let lead_match = self.load_match(&client, workspace_id, company_id, match_id).await?;
        if lead_match.status != MatchStatus::Accepted {
            return Err(BillingError::InvalidTransition(format!(
                "match {} is {}, outcome requires accepted",
                match_id,
                lead_match.status.as_str()
            )));
        }

        if req.outcome == "won" {
            client
                .execute(
                    "UPDATE lead_matches SET status = 'won', won_at = NOW(), won_value = $1
                     WHERE id = $2 AND workspace_id = $3",
                    &[&req.value, &match_id, &workspace_id],
                )
                .await?;
            client
                .execute(
                    "UPDATE service_pros SET total_leads_won = total_leads_won + 1
                     WHERE company_id = $1 AND workspace_id = $2",
                    &[&company_id, &workspace_id],
                )
                .await?;
        } else {
            client
                .execute(
                    "UPDATE lead_matches SET status = 'lost', lost_at = NOW(), lost_reason = $1
                     WHERE id = $2 AND workspace_id = $3",
                    &[&req.reason, &match_id, &workspace_id],
                )
                .await?;
        }

        log_activity(
            &**client,
            workspace_id,
            Some(lead_match.lead_request_id),
            Some(match_id),
            Some(company_id),
            &format!("lead_{}", req.outcome),
            &format!("Lead marked {}", req.outcome),
        )
        .await;

        Ok(())
    }

    /// Admin refund of an accepted match, capped at and referencing the
    /// original charge.
    pub async fn refund_match(
        &self,
        workspace_id: i64,
        lead_id: i64,
        req: &RefundLeadRequest,
    ) -> Result<Decimal, BillingError> {
        let mut client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;
        let tx = client.transaction().await?;

        let sql = format!(
            "{} WHERE id = $1 AND workspace_id = $2 AND lead_request_id = $3 FOR UPDATE",
            MATCH_SELECT
        );
        let row = tx
            .query_opt(sql.as_str(), &[&req.lead_match_id, &workspace_id, &lead_id])
            .await?
            .ok_or(BillingError::NotFound("lead match"))?;
        let lead_match = row_to_match(&row);

        if lead_match.status != MatchStatus::Accepted {
            return Err(BillingError::InvalidTransition(format!(
                "match {} is {}, only accepted matches can be refunded",
                req.lead_match_id,
                lead_match.status.as_str()
            )));
        }

        let charge_transaction_id = lead_match.credit_transaction_id.ok_or_else(|| {
            BillingError::Internal(format!(
                "accepted match {} has no charge transaction",
                req.lead_match_id
            ))
        })?;

        let refs = TxnRefs {
            lead_match_id: Some(req.lead_match_id),
            lead_request_id: Some(lead_id),
            call_log_id: None,
        };
        let refund = self
            .ledger
            .refund_in_tx(
                &tx,
                workspace_id,
                lead_match.company_id,
                req.amount,
                charge_transaction_id,
                &format!("Lead refund (match #{})", req.lead_match_id),
                refs,
            )
            .await?;

        tx.execute(
            "UPDATE lead_matches SET status = 'refunded', refund_transaction_id = $1
             WHERE id = $2 AND workspace_id = $3",
            &[&refund.transaction_id, &req.lead_match_id, &workspace_id],
        )
        .await?;

        log_activity(
            &*tx,
            workspace_id,
            Some(lead_id),
            Some(req.lead_match_id),
            Some(lead_match.company_id),
            "lead_refunded",
            &format!("Refunded {}", refund.amount),
        )
        .await;

        tx.commit().await?;

        Ok(refund.balance_after)
    }

    async fn load_match(
        &self,
        client: &deadpool_postgres::Client,
        workspace_id: i64,
        company_id: i64,
        match_id: i64,
    ) -> Result<LeadMatch, BillingError> {
        let sql = format!(
            "{} WHERE id = $1 AND workspace_id = $2 AND company_id = $3",
            MATCH_SELECT
        );
        let row = client
            .query_opt(sql.as_str(), &[&match_id, &workspace_id, &company_id])
            .await?
            .ok_or(BillingError::NotFound("lead match"))?;

        Ok(row_to_match(&row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn haversine_matches_known_distance() {
        // San Francisco to Los Angeles, roughly 559 km
        let d = haversine_km(37.7749, -122.4194, 34.0522, -118.2437);
        assert!((d - 559.0).abs() < 5.0, "got {}", d);
    }

    #[test]
    fn haversine_zero_for_same_point() {
        assert!(haversine_km(40.0, -70.0, 40.0, -70.0) < 1e-9);
    }

    #[test]
    fn closer_providers_score_higher() {
        let near = score_candidate(Some(2.0), dec!(50), dec!(0));
        let far = score_candidate(Some(20.0), dec!(50), dec!(0));
        assert!(near > far);
    }

    #[test]
    fn funded_providers_break_distance_ties() {
        let rich = score_candidate(Some(10.0), dec!(100), dec!(0));
        let poor = score_candidate(Some(10.0), dec!(5), dec!(0));
        assert!(rich > poor);
    }

    #[test]
    fn balance_contribution_is_capped() {
        let rich = score_candidate(None, dec!(1000), dec!(0));
        let richer = score_candidate(None, dec!(100000), dec!(0));
        assert_eq!(rich, richer);
    }
}
