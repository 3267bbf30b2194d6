// models/walletmodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "wallet_type", rename_all = "lowercase")]
pub enum WalletType {
    Payer,
    Payee,
    Escrow,
    Platform,
}

impl WalletType {
    pub fn to_str(&self) -> &'static str {
        match self {
            WalletType::Payer => "payer",
            WalletType::Payee => "payee",
            WalletType::Escrow => "escrow",
            WalletType::Platform => "platform",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "ledger_kind", rename_all = "lowercase")]
pub enum LedgerKind {
    Hold,
    Release,
    Capture,
    Credit,
    Reversal,
}

impl LedgerKind {
    pub fn to_str(&self) -> &str {
        match self {
            LedgerKind::Hold => "hold",
            LedgerKind::Release => "release",
            LedgerKind::Capture => "capture",
            LedgerKind::Credit => "credit",
            LedgerKind::Reversal => "reversal",
        }
    }
}

/// All balances are minor currency units (cents). Both columns carry a
/// `CHECK (>= 0)` so a bad write fails in the store, not just in code.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Wallet {
    pub id: Uuid,
    pub wallet_type: WalletType,
    pub user_id: Option<Uuid>,
    pub job_instance_id: Option<Uuid>,
    pub available_balance: i64,
    pub held_balance: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One immutable money movement. Single-wallet movements (hold/release)
/// record the wallet as `source_wallet_id`; cross-wallet movements carry
/// both sides. `(reference_type, reference_id, kind)` is unique, which is
/// what makes a replayed settlement call append nothing the second time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub source_wallet_id: Option<Uuid>,
    pub destination_wallet_id: Option<Uuid>,
    pub amount: i64,
    pub kind: LedgerKind,
    pub reference_type: String,
    pub reference_id: Uuid,
    pub idempotency_key: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Business-event tags for ledger rows. One tag per leg keeps the unique
/// `(reference_type, reference_id, kind)` triple collision-free across a
/// multi-leg settlement.
pub mod reference {
    pub const PUBLISH_HOLD: &str = "publish_hold";
    pub const ESCROW_FUNDING: &str = "escrow_funding";
    pub const COMPLETION_PAYOUT: &str = "completion_payout";
    pub const COMPLETION_FEE: &str = "completion_fee";
    pub const CANCELLATION_REFUND: &str = "cancellation_refund";
    pub const EXPIRY_RELEASE: &str = "expiry_release";
    pub const DISPUTE_SETTLEMENT: &str = "dispute_settlement";
    pub const DISPUTE_REFUND: &str = "dispute_refund";
    pub const DISPUTE_PAYOUT: &str = "dispute_payout";
}
