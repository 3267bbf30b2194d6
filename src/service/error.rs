use thiserror::Error;
use uuid::Uuid;

use crate::models::{disputemodel::DisputeStatus, jobmodel::JobStatus};

/// Machine-readable reason codes behind a `PolicyViolation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyReason {
    TrustLevelTooLow,
    MissingCertification,
    ScheduleConflict,
    ReservedForAnotherCaregiver,
    NotACaregiver,
}

impl PolicyReason {
    pub fn as_code(&self) -> &'static str {
        match self {
            PolicyReason::TrustLevelTooLow => "trust_level_too_low",
            PolicyReason::MissingCertification => "missing_certification",
            PolicyReason::ScheduleConflict => "schedule_conflict",
            PolicyReason::ReservedForAnotherCaregiver => "reserved_for_another_caregiver",
            PolicyReason::NotACaregiver => "not_a_caregiver",
        }
    }
}

impl std::fmt::Display for PolicyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Closed error taxonomy for the lifecycle, ledger and dispute engines.
/// Every variant raised inside a unit of work rolls the whole unit back;
/// mapping to transport status codes belongs to the (out of scope) API layer.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Job post {0} not found")]
    JobPostNotFound(Uuid),

    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Wallet {0} not found")]
    WalletNotFound(Uuid),

    #[error("No {wallet_type} wallet provisioned for user {user_id}")]
    UserWalletNotFound {
        user_id: Uuid,
        wallet_type: &'static str,
    },

    #[error("No escrow wallet exists for job {0}")]
    EscrowWalletNotFound(Uuid),

    #[error("Dispute {0} not found")]
    DisputeNotFound(Uuid),

    #[error("User {0} not found")]
    UserNotFound(Uuid),

    #[error("Assignment for job {0} not found")]
    AssignmentNotFound(Uuid),

    #[error("User {actor_id} is not authorized to perform this action on {entity_id}")]
    Unauthorized { actor_id: Uuid, entity_id: Uuid },

    #[error("Job {job_id}: illegal transition {from:?} -> {to:?}")]
    InvalidTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Dispute {dispute_id} is {status:?} and cannot be settled")]
    InvalidDisputeStatus {
        dispute_id: Uuid,
        status: DisputeStatus,
    },

    #[error("Policy violation: {0}")]
    PolicyViolation(PolicyReason),

    #[error("Insufficient available balance on wallet {wallet_id}: required {required}, available {available}")]
    InsufficientAvailableBalance {
        wallet_id: Uuid,
        required: i64,
        available: i64,
    },

    #[error("Insufficient held balance on wallet {wallet_id}: required {required}, held {held}")]
    InsufficientHeldBalance {
        wallet_id: Uuid,
        required: i64,
        held: i64,
    },

    // Escrow shortfalls are a data-integrity alarm, not a user error.
    #[error("Escrow wallet {wallet_id} holds {held} but {required} is owed")]
    InsufficientEscrowBalance {
        wallet_id: Uuid,
        required: i64,
        held: i64,
    },

    #[error("Check-in location is {distance_m}m from the job site, allowed {allowed_m}m")]
    GeofenceViolation { distance_m: i64, allowed_m: i64 },

    #[error("{entity} {entity_id} was modified concurrently, retry after re-reading")]
    ConcurrentModification {
        entity: &'static str,
        entity_id: Uuid,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    /// True when the caller may safely retry once after re-reading state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::ConcurrentModification { .. })
    }

    /// True for failures that should page someone rather than be shown to
    /// a user.
    pub fn is_integrity_alarm(&self) -> bool {
        matches!(self, ServiceError::InsufficientEscrowBalance { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_reason_codes() {
        assert_eq!(PolicyReason::TrustLevelTooLow.as_code(), "trust_level_too_low");
        assert_eq!(PolicyReason::ScheduleConflict.as_code(), "schedule_conflict");
        assert_eq!(
            PolicyReason::ReservedForAnotherCaregiver.as_code(),
            "reserved_for_another_caregiver"
        );
    }

    #[test]
    fn test_retryable_classification() {
        let err = ServiceError::ConcurrentModification {
            entity: "job_post",
            entity_id: Uuid::new_v4(),
        };
        assert!(err.is_retryable());

        let err = ServiceError::GeofenceViolation {
            distance_m: 1200,
            allowed_m: 510,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_escrow_shortfall_is_integrity_alarm() {
        let err = ServiceError::InsufficientEscrowBalance {
            wallet_id: Uuid::new_v4(),
            required: 1100,
            held: 100,
        };
        assert!(err.is_integrity_alarm());
        assert!(!err.is_retryable());
    }
}
