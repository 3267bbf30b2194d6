// service/collaborators.rs
//
// Interfaces onto systems the core deliberately does not contain. Both are
// side channels: the lifecycle engine invokes them after its unit of work
// commits and never lets their failures abort a transition.
use async_trait::async_trait;
use uuid::Uuid;

use crate::service::error::ServiceError;

/// Verification events the external identity stack reports back into the
/// platform. The reputation collaborator turns these into trust level
/// changes; the core only forwards them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustSignal {
    KycVerified,
    BankVerified,
    OtpConfirmed,
}

impl TrustSignal {
    pub fn as_code(&self) -> &'static str {
        match self {
            TrustSignal::KycVerified => "kyc_verified",
            TrustSignal::BankVerified => "bank_verified",
            TrustSignal::OtpConfirmed => "otp_confirmed",
        }
    }
}

/// Posts a system-authored line into the job's chat thread.
#[async_trait]
pub trait MessagingSink: Send + Sync {
    async fn post_system_message(&self, job_id: Uuid, text: &str) -> Result<(), ServiceError>;
}

/// Forwards trust signals to the reputation collaborator.
#[async_trait]
pub trait ReputationSink: Send + Sync {
    async fn on_trust_signal(&self, user_id: Uuid, signal: TrustSignal) -> Result<(), ServiceError>;
}

/// Default sink when no chat backend is wired in: narrate to the log.
#[derive(Debug, Clone, Default)]
pub struct LogMessaging;

#[async_trait]
impl MessagingSink for LogMessaging {
    async fn post_system_message(&self, job_id: Uuid, text: &str) -> Result<(), ServiceError> {
        tracing::info!(job_id = %job_id, "system message: {}", text);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogReputation;

#[async_trait]
impl ReputationSink for LogReputation {
    async fn on_trust_signal(&self, user_id: Uuid, signal: TrustSignal) -> Result<(), ServiceError> {
        tracing::info!(user_id = %user_id, "trust signal: {}", signal.as_code());
        Ok(())
    }
}
