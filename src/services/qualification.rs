// src/services/qualification.rs

use crate::models::{
    CallLog, CallBillingStatus, LeadAttributes, TxnRefs, IngestCallRequest, ProcessCallResponse,
};
use crate::database::DbPool;
use crate::services::{PricingService, WalletLedger};
use crate::error::BillingError;
use std::sync::Arc;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// A call is billable once it reaches the workspace minimum duration.
/// Boundary inclusive: a 90-second call against a 90-second minimum
/// qualifies.
pub fn is_qualified(duration_seconds: i32, min_duration_seconds: i32) -> bool {
    duration_seconds >= min_duration_seconds
}

/// Runs completed calls through qualification and, when auto-billing is on,
/// debits the owning company's wallet.
pub struct CallBillingService {
    db_pool: DbPool,
    pricing: Arc<PricingService>,
    ledger: Arc<WalletLedger>,
}

impl CallBillingService {
    pub fn new(db_pool: DbPool, pricing: Arc<PricingService>, ledger: Arc<WalletLedger>) -> Self {
        Self {
            db_pool,
            pricing,
            ledger,
        }
    }

    /// Record a completed call. Billing happens in `process_call`.
    pub async fn ingest_call(
        &self,
        workspace_id: i64,
        req: &IngestCallRequest,
    ) -> Result<i64, BillingError> {
        if req.duration_seconds < 0 {
            return Err(BillingError::Validation(
                "duration_seconds must not be negative".to_string(),
            ));
        }

        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let call_uuid = req
            .call_uuid
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let started_at = req.started_at.unwrap_or_else(Utc::now);

        let row = client
            .query_one(
                "INSERT INTO call_logs
                 (workspace_id, company_id, campaign_id, call_uuid, phone_number,
                  duration_seconds, postal_code, service_id, started_at,
                  is_qualified, is_billed, billing_status)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, FALSE, 'pending')
                 RETURNING id",
                &[
                    &workspace_id,
                    &req.company_id,
                    &req.campaign_id,
                    &call_uuid,
                    &req.phone_number,
                    &req.duration_seconds,
                    &req.postal_code,
                    &req.service_id,
                    &started_at,
                ],
            )
            .await?;

        let call_id: i64 = row.get(0);
        info!("Call {} ingested ({}s from {})", call_id, req.duration_seconds, req.phone_number);
        Ok(call_id)
    }

    /// Qualify a completed call and bill it when possible. A qualified call
    /// that cannot be billed (auto-bill off, no owning company, insufficient
    /// balance) is left `pending` with its computed price for manual review.
    pub async fn process_call(
        &self,
        workspace_id: i64,
        call_id: i64,
    ) -> Result<ProcessCallResponse, BillingError> {
        let call = self.get_call(workspace_id, call_id).await?;

        if call.is_billed {
            return Err(BillingError::InvalidTransition(
                format!("call {} already billed", call_id),
            ));
        }

        let settings = self.pricing.get_settings(workspace_id).await?;
        let qualified = is_qualified(call.duration_seconds, settings.min_duration_seconds);

        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;
        client
            .execute(
                "UPDATE call_logs SET is_qualified = $1 WHERE id = $2 AND workspace_id = $3",
                &[&qualified, &call_id, &workspace_id],
            )
            .await?;

        if !qualified {
            return Ok(ProcessCallResponse {
                call_id,
                qualified: false,
                billed: false,
                price: None,
                transaction_id: None,
                balance_after: None,
                message: format!(
                    "call duration ({}s) below qualification threshold ({}s)",
                    call.duration_seconds, settings.min_duration_seconds
                ),
            });
        }

        if !settings.auto_bill_enabled {
            return Ok(ProcessCallResponse {
                call_id,
                qualified: true,
                billed: false,
                price: None,
                transaction_id: None,
                balance_after: None,
                message: "call qualified but auto-billing is disabled".to_string(),
            });
        }

        let attrs = LeadAttributes {
            service_ids: call.service_id.into_iter().collect(),
            postal_code: call.postal_code.clone(),
            ..Default::default()
        };
        let quote = self.pricing.quote_call(workspace_id, &attrs).await?;
        let price = quote.price;

        let company_id = match self.resolve_company(&client, workspace_id, &call).await? {
            Some(id) => id,
            None => {
                client
                    .execute(
                        "UPDATE call_logs SET billing_price = $1 WHERE id = $2 AND workspace_id = $3",
                        &[&price, &call_id, &workspace_id],
                    )
                    .await?;
                warn!("Call {} qualified but has no owning company", call_id);
                return Ok(ProcessCallResponse {
                    call_id,
                    qualified: true,
                    billed: false,
                    price: Some(price),
                    transaction_id: None,
                    balance_after: None,
                    message: "no company found for billing".to_string(),
                });
            }
        };

        self.bill_call(workspace_id, company_id, call_id, price).await
    }

    /// Debit the wallet and flip the call to `billed` as one unit.
    async fn bill_call(
        &self,
        workspace_id: i64,
        company_id: i64,
        call_id: i64,
        price: rust_decimal::Decimal,
    ) -> Result<ProcessCallResponse, BillingError> {
        let mut client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let tx = client.transaction().await?;

        let refs = TxnRefs {
            call_log_id: Some(call_id),
            ..Default::default()
        };
        let description = format!("Qualified call charge (call #{})", call_id);

        match self
            .ledger
            .charge_in_tx(&tx, workspace_id, company_id, price, &description, refs)
            .await
        {
            Ok(outcome) => {
                tx.execute(
                    "UPDATE call_logs
                     SET is_billed = TRUE, billed_at = NOW(), billing_price = $1,
                         billing_status = 'billed', company_id = $2, credit_transaction_id = $3
                     WHERE id = $4 AND workspace_id = $5",
                    &[&price, &company_id, &outcome.transaction_id, &call_id, &workspace_id],
                )
                .await?;
                tx.commit().await?;

                info!("Call {} billed ${} to company {}", call_id, price, company_id);

                Ok(ProcessCallResponse {
                    call_id,
                    qualified: true,
                    billed: true,
                    price: Some(price),
                    transaction_id: Some(outcome.transaction_id),
                    balance_after: Some(outcome.balance_after),
                    message: "call billed".to_string(),
                })
            }
            Err(BillingError::InsufficientBalance { required, available }) => {
                tx.rollback().await.ok();

                // Record the price so manual review can re-bill later; the
                // call itself stays pending.
                client
                    .execute(
                        "UPDATE call_logs SET billing_price = $1 WHERE id = $2 AND workspace_id = $3",
                        &[&price, &call_id, &workspace_id],
                    )
                    .await?;

                warn!(
                    "Call {} left pending: insufficient balance (required ${}, available ${})",
                    call_id, required, available
                );

                Ok(ProcessCallResponse {
                    call_id,
                    qualified: true,
                    billed: false,
                    price: Some(price),
                    transaction_id: None,
                    balance_after: None,
                    message: "insufficient wallet balance".to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn list_calls(
        &self,
        workspace_id: i64,
        status: Option<CallBillingStatus>,
        limit: i64,
    ) -> Result<Vec<CallLog>, BillingError> {
        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let limit = limit.clamp(1, 100);

        let rows = match status {
            Some(s) => {
                let sql = format!(
                    "{} WHERE workspace_id = $1 AND billing_status = $2
                     ORDER BY created_at DESC LIMIT $3",
                    CALL_SELECT
                );
                client
                    .query(sql.as_str(), &[&workspace_id, &s.as_str(), &limit])
                    .await?
            }
            None => {
                let sql = format!(
                    "{} WHERE workspace_id = $1 ORDER BY created_at DESC LIMIT $2",
                    CALL_SELECT
                );
                client.query(sql.as_str(), &[&workspace_id, &limit]).await?
            }
        };

        Ok(rows.iter().map(row_to_call).collect())
    }

    pub async fn get_call(&self, workspace_id: i64, call_id: i64) -> Result<CallLog, BillingError> {
        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let sql = format!("{} WHERE id = $1 AND workspace_id = $2", CALL_SELECT);
        let row = client
            .query_opt(sql.as_str(), &[&call_id, &workspace_id])
            .await?
            .ok_or(BillingError::NotFound("call"))?;

        Ok(row_to_call(&row))
    }

    /// The owning company comes from the call itself or from its campaign.
    async fn resolve_company(
        &self,
        client: &deadpool_postgres::Client,
        workspace_id: i64,
        call: &CallLog,
    ) -> Result<Option<i64>, BillingError> {
        if call.company_id.is_some() {
            return Ok(call.company_id);
        }

        if let Some(campaign_id) = call.campaign_id {
            let row = client
                .query_opt(
                    "SELECT company_id FROM call_campaigns WHERE id = $1 AND workspace_id = $2",
                    &[&campaign_id, &workspace_id],
                )
                .await?;
            return Ok(row.and_then(|r| r.get::<_, Option<i64>>(0)));
        }

        Ok(None)
    }
}

const CALL_SELECT: &str =
    "SELECT id, workspace_id, company_id, campaign_id, call_uuid, phone_number,
            duration_seconds, postal_code, service_id, started_at, is_qualified,
            is_billed, billing_price, billing_status, billed_at,
            credit_transaction_id, created_at
     FROM call_logs";

fn row_to_call(row: &tokio_postgres::Row) -> CallLog {
    let billing_status: String = row.get(13);
    let started_at: DateTime<Utc> = row.get(9);

    CallLog {
        id: row.get(0),
        workspace_id: row.get(1),
        company_id: row.get(2),
        campaign_id: row.get(3),
        call_uuid: row.get(4),
        phone_number: row.get(5),
        duration_seconds: row.get(6),
        postal_code: row.get(7),
        service_id: row.get(8),
        started_at,
        is_qualified: row.get(10),
        is_billed: row.get(11),
        billing_price: row.get(12),
        billing_status: CallBillingStatus::from_str(&billing_status),
        billed_at: row.get(14),
        credit_transaction_id: row.get(15),
        created_at: row.get(16),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualification_boundary_is_inclusive() {
        assert!(!is_qualified(89, 90));
        assert!(is_qualified(90, 90));
        assert!(is_qualified(91, 90));
    }

    #[test]
    fn zero_minimum_qualifies_everything() {
        assert!(is_qualified(0, 0));
        assert!(is_qualified(1, 0));
    }
}
