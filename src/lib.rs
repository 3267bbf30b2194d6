pub mod config;
pub mod db;
pub mod dtos;
pub mod models;
pub mod service;
pub mod utils;

use std::sync::Arc;

use crate::db::db::DBClient;
use crate::service::{
    audit_service::AuditService,
    collaborators::{LogMessaging, LogReputation, MessagingSink, ReputationSink, TrustSignal},
    dispute_service::DisputeService,
    error::ServiceError,
    job_service::JobService,
    settlement_service::SettlementService,
};

/// Wired-up core: the lifecycle controller, settlement engine and dispute
/// engine over one `DBClient`, plus the collaborator sinks. Transport
/// layers hold one of these and call straight through.
#[derive(Clone)]
pub struct CoreServices {
    pub db_client: Arc<DBClient>,
    pub job_service: Arc<JobService>,
    pub settlement_service: Arc<SettlementService>,
    pub dispute_service: Arc<DisputeService>,
    pub audit_service: Arc<AuditService>,
    reputation: Arc<dyn ReputationSink>,
}

impl CoreServices {
    pub fn new(db_client: DBClient) -> Self {
        Self::with_sinks(db_client, Arc::new(LogMessaging), Arc::new(LogReputation))
    }

    pub fn with_sinks(
        db_client: DBClient,
        messaging: Arc<dyn MessagingSink>,
        reputation: Arc<dyn ReputationSink>,
    ) -> Self {
        let db_client = Arc::new(db_client);

        let audit_service = Arc::new(AuditService::new(db_client.clone()));
        let settlement_service = Arc::new(SettlementService::new(db_client.clone()));
        let job_service = Arc::new(JobService::new(
            db_client.clone(),
            settlement_service.clone(),
            audit_service.clone(),
            messaging,
        ));
        let dispute_service = Arc::new(DisputeService::new(
            db_client.clone(),
            audit_service.clone(),
        ));

        CoreServices {
            db_client,
            job_service,
            settlement_service,
            dispute_service,
            audit_service,
            reputation,
        }
    }

    /// Hook the external KYC / bank-verification / OTP collaborators call
    /// when a user clears a verification step.
    pub async fn on_trust_signal(
        &self,
        user_id: uuid::Uuid,
        signal: TrustSignal,
    ) -> Result<(), ServiceError> {
        self.reputation.on_trust_signal(user_id, signal).await
    }
}
