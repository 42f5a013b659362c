// src/services/ledger.rs
use crate::models::{Wallet, CreditTransaction, TransactionType, TxnRefs};
use crate::database::DbPool;
use crate::error::BillingError;
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};
use deadpool_postgres::Transaction;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ChargeOutcome {
    pub transaction_id: i64,
    pub balance_after: Decimal,
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub transaction_id: i64,
    pub amount: Decimal,
    pub balance_after: Decimal,
}

/// Wallet mutations. Every debit/credit runs inside a database transaction
/// with the wallet row locked `FOR UPDATE`: the transaction row and the new
/// balance are persisted as one unit or not at all.
pub struct WalletLedger {
    db_pool: DbPool,
}

impl WalletLedger {
    pub fn new(db_pool: DbPool) -> Self {
        Self { db_pool }
    }

    /// Fetch a company wallet, creating an empty one on first touch.
    pub async fn get_wallet(
        &self,
        workspace_id: i64,
        company_id: i64,
    ) -> Result<Wallet, BillingError> {
        let mut client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let tx = client.transaction().await?;
        let (wallet_id, _) = Self::wallet_for_update(&tx, workspace_id, company_id).await?;

        let row = tx
            .query_one(
                "SELECT id, workspace_id, company_id, balance, lifetime_purchased,
                        lifetime_spent, lifetime_refunded, created_at, updated_at
                 FROM credits_wallets WHERE id = $1",
                &[&wallet_id],
            )
            .await?;
        tx.commit().await?;

        Ok(row_to_wallet(&row))
    }

    /// Debit `amount` from the company wallet. Fails with
    /// `InsufficientBalance` and persists nothing when the balance does not
    /// cover the charge.
    pub async fn charge(
        &self,
        workspace_id: i64,
        company_id: i64,
        amount: Decimal,
        description: &str,
        refs: TxnRefs,
    ) -> Result<ChargeOutcome, BillingError> {
        let mut client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let tx = client.transaction().await?;
        let outcome = self
            .charge_in_tx(&tx, workspace_id, company_id, amount, description, refs)
            .await?;
        tx.commit().await?;

        Ok(outcome)
    }

    /// Charge within a caller-owned transaction, so the debit can commit
    /// atomically with the state change that caused it (lead acceptance,
    /// call billing).
    pub async fn charge_in_tx(
        &self,
        tx: &Transaction<'_>,
        workspace_id: i64,
        company_id: i64,
        amount: Decimal,
        description: &str,
        refs: TxnRefs,
    ) -> Result<ChargeOutcome, BillingError> {
        if amount <= Decimal::ZERO {
            return Err(BillingError::Validation(
                "charge amount must be positive".to_string(),
            ));
        }

        let (wallet_id, balance_before) =
            Self::wallet_for_update(tx, workspace_id, company_id).await?;

        if balance_before < amount {
            warn!(
                "Insufficient balance for company {}: required ${}, available ${}",
                company_id, amount, balance_before
            );
            return Err(BillingError::InsufficientBalance {
                required: amount.to_string(),
                available: balance_before.to_string(),
            });
        }

        let balance_after = balance_before - amount;

        tx.execute(
            "UPDATE credits_wallets
             SET balance = $1, lifetime_spent = lifetime_spent + $2,
                 last_charge_at = NOW(), updated_at = NOW()
             WHERE id = $3",
            &[&balance_after, &amount, &wallet_id],
        )
        .await?;

        let transaction_id = Self::insert_transaction(
            tx,
            workspace_id,
            company_id,
            wallet_id,
            TransactionType::Charge,
            -amount,
            balance_before,
            balance_after,
            description,
            refs,
            None,
            None,
        )
        .await?;

        info!(
            "Wallet {} charged ${} ({}). Balance: ${} -> ${}",
            wallet_id, amount, description, balance_before, balance_after
        );

        Ok(ChargeOutcome {
            transaction_id,
            balance_after,
        })
    }

    /// Credit the wallet (purchase, adjustment, bonus, promo). Purchases
    /// carrying a payment id are idempotent: re-delivered webhooks credit
    /// once.
    pub async fn credit(
        &self,
        workspace_id: i64,
        company_id: i64,
        amount: Decimal,
        txn_type: TransactionType,
        description: &str,
        payment: Option<(&str, &str)>,
    ) -> Result<ChargeOutcome, BillingError> {
        if amount <= Decimal::ZERO {
            return Err(BillingError::Validation(
                "credit amount must be positive".to_string(),
            ));
        }

        let mut client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let tx = client.transaction().await?;

        if let Some((provider, payment_id)) = payment {
            let existing = tx
                .query_opt(
                    "SELECT id, balance_after FROM credit_transactions
                     WHERE payment_provider = $1 AND payment_id = $2
                     LIMIT 1",
                    &[&provider, &payment_id],
                )
                .await?;

            if let Some(row) = existing {
                tx.commit().await?;
                info!("Duplicate payment {} ignored", payment_id);
                return Ok(ChargeOutcome {
                    transaction_id: row.get(0),
                    balance_after: row.get(1),
                });
            }
        }

        let (wallet_id, balance_before) =
            Self::wallet_for_update(&tx, workspace_id, company_id).await?;
        let balance_after = balance_before + amount;

        // Only real purchases move the lifetime counter; adjustments,
        // bonuses and promos touch the balance alone.
        if txn_type == TransactionType::Purchase {
            tx.execute(
                "UPDATE credits_wallets
                 SET balance = $1, lifetime_purchased = lifetime_purchased + $2,
                     last_purchase_at = NOW(), updated_at = NOW()
                 WHERE id = $3",
                &[&balance_after, &amount, &wallet_id],
            )
            .await?;
        } else {
            tx.execute(
                "UPDATE credits_wallets SET balance = $1, updated_at = NOW() WHERE id = $2",
                &[&balance_after, &wallet_id],
            )
            .await?;
        }

        let transaction_id = Self::insert_transaction(
            &tx,
            workspace_id,
            company_id,
            wallet_id,
            txn_type,
            amount,
            balance_before,
            balance_after,
            description,
            TxnRefs::default(),
            None,
            payment,
        )
        .await?;

        tx.commit().await?;

        info!(
            "Wallet {} credited ${} ({}). Balance: ${} -> ${}",
            wallet_id, amount, txn_type.as_str(), balance_before, balance_after
        );

        Ok(ChargeOutcome {
            transaction_id,
            balance_after,
        })
    }

    /// Refund against an original charge, inside a caller-owned transaction.
    /// The refund references the charge row and is capped at its absolute
    /// amount; `requested = None` refunds in full.
    pub async fn refund_in_tx(
        &self,
        tx: &Transaction<'_>,
        workspace_id: i64,
        company_id: i64,
        requested: Option<Decimal>,
        original_transaction_id: i64,
        description: &str,
        refs: TxnRefs,
    ) -> Result<RefundOutcome, BillingError> {
        let original = tx
            .query_opt(
                "SELECT amount, type FROM credit_transactions
                 WHERE id = $1 AND workspace_id = $2 AND company_id = $3",
                &[&original_transaction_id, &workspace_id, &company_id],
            )
            .await?
            .ok_or(BillingError::NotFound("charge transaction"))?;

        let original_amount: Decimal = original.get(0);
        let original_type: String = original.get(1);
        if TransactionType::from_str(&original_type) != TransactionType::Charge {
            return Err(BillingError::Validation(
                "refund must reference a charge transaction".to_string(),
            ));
        }

        let charged = original_amount.abs();
        let amount = match requested {
            Some(r) if r <= Decimal::ZERO => {
                return Err(BillingError::Validation(
                    "refund amount must be positive".to_string(),
                ))
            }
            Some(r) => r.min(charged),
            None => charged,
        };

        let (wallet_id, balance_before) =
            Self::wallet_for_update(tx, workspace_id, company_id).await?;
        let balance_after = balance_before + amount;

        tx.execute(
            "UPDATE credits_wallets
             SET balance = $1, lifetime_refunded = lifetime_refunded + $2, updated_at = NOW()
             WHERE id = $3",
            &[&balance_after, &amount, &wallet_id],
        )
        .await?;

        let transaction_id = Self::insert_transaction(
            tx,
            workspace_id,
            company_id,
            wallet_id,
            TransactionType::Refund,
            amount,
            balance_before,
            balance_after,
            description,
            refs,
            Some(original_transaction_id),
            None,
        )
        .await?;

        info!(
            "Wallet {} refunded ${} against transaction {}. Balance: ${} -> ${}",
            wallet_id, amount, original_transaction_id, balance_before, balance_after
        );

        Ok(RefundOutcome {
            transaction_id,
            amount,
            balance_after,
        })
    }

    pub async fn list_transactions(
        &self,
        workspace_id: i64,
        company_id: i64,
        txn_type: Option<TransactionType>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CreditTransaction>, BillingError> {
        let client = self.db_pool.get().await
            .map_err(|e| BillingError::Internal(e.to_string()))?;

        let limit = limit.clamp(1, 100);

        let rows = match txn_type {
            Some(t) => {
                client
                    .query(
                        "SELECT id, workspace_id, company_id, wallet_id, type, amount,
                                balance_before, balance_after, lead_match_id, lead_request_id,
                                call_log_id, related_transaction_id, payment_provider,
                                payment_id, description, created_at
                         FROM credit_transactions
                         WHERE workspace_id = $1 AND company_id = $2 AND type = $3
                         ORDER BY created_at DESC LIMIT $4 OFFSET $5",
                        &[&workspace_id, &company_id, &t.as_str(), &limit, &offset],
                    )
                    .await?
            }
            None => {
                client
                    .query(
                        "SELECT id, workspace_id, company_id, wallet_id, type, amount,
                                balance_before, balance_after, lead_match_id, lead_request_id,
                                call_log_id, related_transaction_id, payment_provider,
                                payment_id, description, created_at
                         FROM credit_transactions
                         WHERE workspace_id = $1 AND company_id = $2
                         ORDER BY created_at DESC LIMIT $3 OFFSET $4",
                        &[&workspace_id, &company_id, &limit, &offset],
                    )
                    .await?
            }
        };

        Ok(rows.iter().map(row_to_transaction).collect())
    }

    /// Lock the wallet row, creating it with a zero balance if missing.
    async fn wallet_for_update(
        tx: &Transaction<'_>,
        workspace_id: i64,
        company_id: i64,
    ) -> Result<(i64, Decimal), BillingError> {
        let row = tx
            .query_opt(
                "SELECT id, balance FROM credits_wallets
                 WHERE workspace_id = $1 AND company_id = $2
                 FOR UPDATE",
                &[&workspace_id, &company_id],
            )
            .await?;

        match row {
            Some(r) => Ok((r.get(0), r.get(1))),
            None => {
                let inserted = tx
                    .query_one(
                        "INSERT INTO credits_wallets (workspace_id, company_id, balance)
                         VALUES ($1, $2, 0)
                         RETURNING id",
                        &[&workspace_id, &company_id],
                    )
                    .await?;
                Ok((inserted.get(0), Decimal::ZERO))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_transaction(
        tx: &Transaction<'_>,
        workspace_id: i64,
        company_id: i64,
        wallet_id: i64,
        txn_type: TransactionType,
        amount: Decimal,
        balance_before: Decimal,
        balance_after: Decimal,
        description: &str,
        refs: TxnRefs,
        related_transaction_id: Option<i64>,
        payment: Option<(&str, &str)>,
    ) -> Result<i64, BillingError> {
        let (payment_provider, payment_id) = match payment {
            Some((provider, id)) => (Some(provider), Some(id)),
            None => (None, None),
        };

        let row = tx
            .query_one(
                "INSERT INTO credit_transactions
                 (workspace_id, company_id, wallet_id, type, amount, balance_before,
                  balance_after, lead_match_id, lead_request_id, call_log_id,
                  related_transaction_id, payment_provider, payment_id, description)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                 RETURNING id",
                &[
                    &workspace_id,
                    &company_id,
                    &wallet_id,
                    &txn_type.as_str(),
                    &amount,
                    &balance_before,
                    &balance_after,
                    &refs.lead_match_id,
                    &refs.lead_request_id,
                    &refs.call_log_id,
                    &related_transaction_id,
                    &payment_provider,
                    &payment_id,
                    &description,
                ],
            )
            .await?;

        Ok(row.get(0))
    }
}

fn row_to_wallet(row: &tokio_postgres::Row) -> Wallet {
    let created_at: DateTime<Utc> = row.get(7);
    let updated_at: DateTime<Utc> = row.get(8);

    Wallet {
        id: row.get(0),
        workspace_id: row.get(1),
        company_id: row.get(2),
        balance: row.get(3),
        lifetime_purchased: row.get(4),
        lifetime_spent: row.get(5),
        lifetime_refunded: row.get(6),
        created_at,
        updated_at,
    }
}

fn row_to_transaction(row: &tokio_postgres::Row) -> CreditTransaction {
    let txn_type: String = row.get(4);

    CreditTransaction {
        id: row.get(0),
        workspace_id: row.get(1),
        company_id: row.get(2),
        wallet_id: row.get(3),
        txn_type: TransactionType::from_str(&txn_type),
        amount: row.get(5),
        balance_before: row.get(6),
        balance_after: row.get(7),
        lead_match_id: row.get(8),
        lead_request_id: row.get(9),
        call_log_id: row.get(10),
        related_transaction_id: row.get(11),
        payment_provider: row.get(12),
        payment_id: row.get(13),
        description: row.get(14),
        created_at: row.get(15),
    }
}
