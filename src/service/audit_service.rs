// service/audit_service.rs
use std::sync::Arc;
use serde_json::json;
use uuid::Uuid;

use crate::db::db::DBClient;
use crate::models::usermodel::Actor;

/// Compliance trail for every lifecycle and settlement action.
///
/// Best-effort by contract: a failed audit write is logged and swallowed so
/// a non-critical side channel can never block or roll back a financial
/// transition. That is why every method here returns `()` and runs after
/// the unit of work commits.
#[derive(Debug, Clone)]
pub struct AuditService {
    db_client: Arc<DBClient>,
}

impl AuditService {
    pub fn new(db_client: Arc<DBClient>) -> Self {
        Self { db_client }
    }

    pub async fn record(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        action: &str,
        before: Option<&str>,
        after: Option<&str>,
        actor_id: Option<Uuid>,
        metadata: Option<serde_json::Value>,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs
            (entity_type, entity_id, action, actor_id, before_state, after_state, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(action)
        .bind(actor_id)
        .bind(before)
        .bind(after)
        .bind(metadata)
        .execute(&self.db_client.pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(
                entity_type,
                entity_id = %entity_id,
                action,
                "audit write failed (swallowed): {}",
                e
            );
        }
    }

    pub async fn log_job_transition(
        &self,
        actor: &Actor,
        entity_type: &str,
        entity_id: Uuid,
        action: &str,
        before: &str,
        after: &str,
        metadata: Option<serde_json::Value>,
    ) {
        self.record(
            entity_type,
            entity_id,
            action,
            Some(before),
            Some(after),
            Some(actor.id),
            metadata,
        )
        .await;
    }

    pub async fn log_settlement(
        &self,
        actor_id: Option<Uuid>,
        job_id: Uuid,
        action: &str,
        amount_cents: i64,
    ) {
        self.record(
            "job_instance",
            job_id,
            action,
            None,
            None,
            actor_id,
            Some(json!({ "amount_cents": amount_cents })),
        )
        .await;
    }

    pub async fn log_dispute_settlement(
        &self,
        arbitrator_id: Uuid,
        dispute_id: Uuid,
        refund_cents: i64,
        payout_cents: i64,
    ) {
        self.record(
            "dispute",
            dispute_id,
            "dispute_settled",
            None,
            Some("resolved"),
            Some(arbitrator_id),
            Some(json!({
                "refund_amount_cents": refund_cents,
                "payout_amount_cents": payout_cents,
            })),
        )
        .await;
    }
}
