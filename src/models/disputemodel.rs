// models/disputemodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "dispute_status", rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    InReview,
    Resolved,
    Rejected,
}

impl DisputeStatus {
    pub fn to_str(&self) -> &str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::InReview => "in_review",
            DisputeStatus::Resolved => "resolved",
            DisputeStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DisputeStatus::Resolved | DisputeStatus::Rejected)
    }

    /// Settlement actions are only legal while the dispute is live.
    pub fn is_settleable(&self) -> bool {
        matches!(self, DisputeStatus::Open | DisputeStatus::InReview)
    }
}

/// Opened by an external actor; exclusively mutated by the dispute engine.
/// Settlement amounts and the idempotency key are persisted at resolution
/// time so a replayed settle call can return the recorded outcome.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Dispute {
    pub id: Uuid,
    pub job_instance_id: Uuid,
    pub raised_by: Uuid,
    pub reason: String,
    pub status: DisputeStatus,
    pub arbitrator_id: Option<Uuid>,
    pub refund_amount_cents: Option<i64>,
    pub payout_amount_cents: Option<i64>,
    pub resolution_note: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Outcome of a settlement call, also what a replayed call gets back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeSettlement {
    pub dispute_id: Uuid,
    pub refund_amount_cents: i64,
    pub payout_amount_cents: i64,
    pub status: DisputeStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(DisputeStatus::Resolved.is_terminal());
        assert!(DisputeStatus::Rejected.is_terminal());
        assert!(!DisputeStatus::Open.is_terminal());
        assert!(!DisputeStatus::InReview.is_terminal());
    }

    #[test]
    fn test_settleable_statuses() {
        assert!(DisputeStatus::Open.is_settleable());
        assert!(DisputeStatus::InReview.is_settleable());
        assert!(!DisputeStatus::Resolved.is_settleable());
        assert!(!DisputeStatus::Rejected.is_settleable());
    }
}
