// src/services/disputes.rs

use crate::models::{
    CallDispute, DisputeStatus, DisputeType, TxnRefs, OpenDisputeRequest, ResolveDisputeRequest,
    ResolveDisputeResponse,
};
use crate::database::DbPool;
use crate::services::{PricingService, WalletLedger};
use crate::error::BillingError;
use std::sync::Arc;
use rust_decimal::Decimal;
use chrono::{DateTime, Utc, Duration};
use tracing::info;

/// Contractor-initiated challenges against billed calls.
///
/// pending → under_review → {approved, rejected, partial_refund}. Terminal
/// resolutions are idempotent-by-error: resolving twice fails instead of
/// refunding twice.
pub struct DisputeService {
    db_pool: DbPool,
    pricing: Arc<PricingService>,
    ledger: Arc<WalletLedger>,
}

impl DisputeService {
    pub fn new(db_pool: DbPool, pricing: Arc<PricingService>, ledger: Arc<WalletLedger>) -> Self {
        Self {
            db_pool,
            pricing,
            ledger,
        }
    }

    /// Open a dispute. Only billed calls can be disputed, only within the
    /// workspace dispute window, and only one open dispute per call.
    pub async fn open_dispute(
        &self,
        workspace_id: i64,
        company_id: i64,
        req: &OpenDisputeRequest,
    ) -> Result<i64, BillingError> {
        let settings = self.pricing.get_settings(workspace_id).await?;

        let mut client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;
        let tx = client.transaction().await?;

        let call = tx
            .query_opt(
                "SELECT billing_status, billed_at, credit_transaction_id
                 FROM call_logs
                 WHERE id = $1 AND workspace_id = $2
                 FOR UPDATE",
                &[&req.call_log_id, &workspace_id],
            )
            .await?
            .ok_or(BillingError::NotFound("call"))?;

        let billing_status: String = call.get(0);
        if billing_status != "billed" {
            return Err(BillingError::InvalidTransition(format!(
                "call {} is {}, only billed calls can be disputed",
                req.call_log_id, billing_status
            )));
        }

        let billed_at: Option<DateTime<Utc>> = call.get(1);
        let billed_at = billed_at
            .ok_or_else(|| BillingError::Internal("billed call has no billed_at".to_string()))?;

        // Window enforced on the server clock, not the client's.
        let window = Duration::hours(settings.dispute_window_hours);
        if Utc::now() - billed_at > window {
            return Err(BillingError::DisputeWindowExpired {
                window_hours: settings.dispute_window_hours,
            });
        }

        let open = tx
            .query_opt(
                "SELECT id FROM call_disputes
                 WHERE call_log_id = $1 AND workspace_id = $2
                   AND status IN ('pending', 'under_review')
                 LIMIT 1",
                &[&req.call_log_id, &workspace_id],
            )
            .await?;
        if open.is_some() {
            return Err(BillingError::InvalidTransition(format!(
                "call {} already has an open dispute",
                req.call_log_id
            )));
        }

        let credit_transaction_id: Option<i64> = call.get(2);

        let row = tx
            .query_one(
                "INSERT INTO call_disputes
                 (workspace_id, company_id, call_log_id, credit_transaction_id,
                  dispute_type, description, status)
                 VALUES ($1, $2, $3, $4, $5, $6, 'pending')
                 RETURNING id",
                &[
                    &workspace_id,
                    &company_id,
                    &req.call_log_id,
                    &credit_transaction_id,
                    &req.dispute_type.as_str(),
                    &req.description,
                ],
            )
            .await?;
        let dispute_id: i64 = row.get(0);

        tx.execute(
            "UPDATE call_logs SET billing_status = 'disputed', disputed_at = NOW()
             WHERE id = $1 AND workspace_id = $2",
            &[&req.call_log_id, &workspace_id],
        )
        .await?;

        tx.commit().await?;

        info!(
            "Dispute {} opened on call {} by company {}",
            dispute_id, req.call_log_id, company_id
        );
        Ok(dispute_id)
    }

    /// Resolve a dispute. Approval refunds the original charge in full,
    /// partial refunds are capped at it, rejection restores the call to
    /// `billed` with no ledger effect.
    pub async fn resolve_dispute(
        &self,
        workspace_id: i64,
        dispute_id: i64,
        req: &ResolveDisputeRequest,
    ) -> Result<ResolveDisputeResponse, BillingError> {
        let mut client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(
                "SELECT status, company_id, call_log_id, credit_transaction_id
                 FROM call_disputes
                 WHERE id = $1 AND workspace_id = $2
                 FOR UPDATE",
                &[&dispute_id, &workspace_id],
            )
            .await?
            .ok_or(BillingError::NotFound("dispute"))?;

        let status_str: String = row.get(0);
        let current = DisputeStatus::from_str(&status_str);
        let company_id: i64 = row.get(1);
        let call_log_id: i64 = row.get(2);
        let charge_transaction_id: Option<i64> = row.get(3);

        if current.is_terminal() {
            return Err(BillingError::DisputeAlreadyResolved);
        }
        if !current.can_transition_to(req.resolution) {
            return Err(BillingError::InvalidTransition(format!(
                "dispute cannot move from {} to {}",
                current.as_str(),
                req.resolution.as_str()
            )));
        }

        let response = match req.resolution {
            DisputeStatus::UnderReview => {
                tx.execute(
                    "UPDATE call_disputes SET status = 'under_review' WHERE id = $1",
                    &[&dispute_id],
                )
                .await?;

                ResolveDisputeResponse {
                    status: DisputeStatus::UnderReview,
                    refund_amount: Decimal::ZERO,
                    refund_transaction_id: None,
                }
            }
            DisputeStatus::Rejected => {
                tx.execute(
                    "UPDATE call_disputes
                     SET status = 'rejected', resolution_notes = $2, resolved_by = $3,
                         resolved_at = NOW()
                     WHERE id = $1",
                    &[&dispute_id, &req.notes, &req.resolved_by],
                )
                .await?;
                tx.execute(
                    "UPDATE call_logs SET billing_status = 'billed'
                     WHERE id = $1 AND workspace_id = $2",
                    &[&call_log_id, &workspace_id],
                )
                .await?;

                ResolveDisputeResponse {
                    status: DisputeStatus::Rejected,
                    refund_amount: Decimal::ZERO,
                    refund_transaction_id: None,
                }
            }
            DisputeStatus::Approved | DisputeStatus::PartialRefund => {
                let charge_transaction_id = charge_transaction_id.ok_or_else(|| {
                    BillingError::Internal(format!(
                        "dispute {} has no charge transaction to refund",
                        dispute_id
                    ))
                })?;

                let requested = if req.resolution == DisputeStatus::PartialRefund {
                    Some(req.refund_amount.ok_or_else(|| {
                        BillingError::Validation(
                            "refund_amount is required for a partial refund".to_string(),
                        )
                    })?)
                } else {
                    None
                };

                let refs = TxnRefs {
                    call_log_id: Some(call_log_id),
                    ..Default::default()
                };
                let refund = self
                    .ledger
                    .refund_in_tx(
                        &tx,
                        workspace_id,
                        company_id,
                        requested,
                        charge_transaction_id,
                        &format!("Dispute refund for call #{}", call_log_id),
                        refs,
                    )
                    .await?;

                tx.execute(
                    "UPDATE call_logs SET billing_status = 'refunded', refunded_at = NOW()
                     WHERE id = $1 AND workspace_id = $2",
                    &[&call_log_id, &workspace_id],
                )
                .await?;
                tx.execute(
                    "UPDATE call_disputes
                     SET status = $2, refund_amount = $3, resolution_notes = $4,
                         resolved_by = $5, resolved_at = NOW()
                     WHERE id = $1",
                    &[
                        &dispute_id,
                        &req.resolution.as_str(),
                        &refund.amount,
                        &req.notes,
                        &req.resolved_by,
                    ],
                )
                .await?;

                ResolveDisputeResponse {
                    status: req.resolution,
                    refund_amount: refund.amount,
                    refund_transaction_id: Some(refund.transaction_id),
                }
            }
            DisputeStatus::Pending => {
                return Err(BillingError::InvalidTransition(
                    "a dispute cannot be resolved back to pending".to_string(),
                ));
            }
        };

        tx.commit().await?;

        info!(
            "Dispute {} resolved as {} (refund ${})",
            dispute_id,
            response.status.as_str(),
            response.refund_amount
        );
        Ok(response)
    }

    pub async fn list_disputes(
        &self,
        workspace_id: i64,
        status: Option<DisputeStatus>,
        limit: i64,
    ) -> Result<Vec<CallDispute>, BillingError> {
        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let limit = limit.clamp(1, 100);

        let rows = match status {
            Some(s) => {
                let sql = format!(
                    "{} WHERE workspace_id = $1 AND status = $2
                     ORDER BY created_at DESC LIMIT $3",
                    DISPUTE_SELECT
                );
                client
                    .query(sql.as_str(), &[&workspace_id, &s.as_str(), &limit])
                    .await?
            }
            None => {
                let sql = format!(
                    "{} WHERE workspace_id = $1 ORDER BY created_at DESC LIMIT $2",
                    DISPUTE_SELECT
                );
                client.query(sql.as_str(), &[&workspace_id, &limit]).await?
            }
        };

        Ok(rows.iter().map(row_to_dispute).collect())
    }
}

const DISPUTE_SELECT: &str =
    "SELECT id, workspace_id, company_id, call_log_id, credit_transaction_id,
            dispute_type, description, status, refund_amount, resolution_notes,
            resolved_by, resolved_at, created_at
     FROM call_disputes";

fn row_to_dispute(row: &tokio_postgres::Row) -> CallDispute {
    let dispute_type: String = row.get(5);
    let status: String = row.get(7);

    CallDispute {
        id: row.get(0),
        workspace_id: row.get(1),
        company_id: row.get(2),
        call_log_id: row.get(3),
        credit_transaction_id: row.get(4),
        dispute_type: DisputeType::from_str(&dispute_type),
        description: row.get(6),
        status: DisputeStatus::from_str(&status),
        refund_amount: row.get(8),
        resolution_notes: row.get(9),
        resolved_by: row.get(10),
        resolved_at: row.get(11),
        created_at: row.get(12),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_reach_every_other_state() {
        let pending = DisputeStatus::Pending;
        assert!(pending.can_transition_to(DisputeStatus::UnderReview));
        assert!(pending.can_transition_to(DisputeStatus::Approved));
        assert!(pending.can_transition_to(DisputeStatus::Rejected));
        assert!(pending.can_transition_to(DisputeStatus::PartialRefund));
        assert!(!pending.can_transition_to(DisputeStatus::Pending));
    }

    #[test]
    fn under_review_only_reaches_terminal_states() {
        let reviewing = DisputeStatus::UnderReview;
        assert!(reviewing.can_transition_to(DisputeStatus::Approved));
        assert!(reviewing.can_transition_to(DisputeStatus::Rejected));
        assert!(reviewing.can_transition_to(DisputeStatus::PartialRefund));
        assert!(!reviewing.can_transition_to(DisputeStatus::UnderReview));
        assert!(!reviewing.can_transition_to(DisputeStatus::Pending));
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for terminal in [
            DisputeStatus::Approved,
            DisputeStatus::Rejected,
            DisputeStatus::PartialRefund,
        ] {
            assert!(terminal.is_terminal());
            for next in [
                DisputeStatus::Pending,
                DisputeStatus::UnderReview,
                DisputeStatus::Approved,
                DisputeStatus::Rejected,
                DisputeStatus::PartialRefund,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }
}
