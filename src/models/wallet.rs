// src/models/wallet.rs
use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use chrono::{DateTime, Utc};

/// Credit wallet for a provider company. The balance is a cached derivation
/// of the transaction log and is only ever written alongside a transaction
/// row, inside the same database transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub workspace_id: i64,
    pub company_id: i64,
    pub balance: Decimal,
    pub lifetime_purchased: Decimal,
    pub lifetime_spent: Decimal,
    pub lifetime_refunded: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn can_cover(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Purchase,
    Charge,
    Refund,
    Adjustment,
    Bonus,
    Promo,
}

impl TransactionType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "purchase" => TransactionType::Purchase,
            "charge" => TransactionType::Charge,
            "refund" => TransactionType::Refund,
            "bonus" => TransactionType::Bonus,
            "promo" => TransactionType::Promo,
            _ => TransactionType::Adjustment,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Charge => "charge",
            TransactionType::Refund => "refund",
            TransactionType::Adjustment => "adjustment",
            TransactionType::Bonus => "bonus",
            TransactionType::Promo => "promo",
        }
    }
}

/// Append-only ledger row. Charges carry a negative amount, credits positive;
/// both snapshot the wallet balance on either side of the mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: i64,
    pub workspace_id: i64,
    pub company_id: i64,
    pub wallet_id: i64,
    #[serde(rename = "type")]
    pub txn_type: TransactionType,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub lead_match_id: Option<i64>,
    pub lead_request_id: Option<i64>,
    pub call_log_id: Option<i64>,
    pub related_transaction_id: Option<i64>,
    pub payment_provider: Option<String>,
    pub payment_id: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Optional foreign references attached to a ledger entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TxnRefs {
    pub lead_match_id: Option<i64>,
    pub lead_request_id: Option<i64>,
    pub call_log_id: Option<i64>,
}
