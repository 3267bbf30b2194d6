// db/disputedb.rs
use async_trait::async_trait;
use uuid::Uuid;
use sqlx::{Postgres, Transaction};

use super::db::DBClient;
use crate::models::disputemodel::*;
use crate::service::error::ServiceError;

const DISPUTE_COLUMNS: &str = r#"
    id, job_instance_id, raised_by, reason, status, arbitrator_id,
    refund_amount_cents, payout_amount_cents, resolution_note,
    idempotency_key, created_at, resolved_at
"#;

#[async_trait]
pub trait DisputeExt {
    /// Entry point for the (external) party raising a dispute; every later
    /// mutation goes through the dispute engine.
    async fn create_dispute(
        &self,
        job_instance_id: Uuid,
        raised_by: Uuid,
        reason: String,
    ) -> Result<Dispute, ServiceError>;

    async fn get_dispute(&self, dispute_id: Uuid) -> Result<Option<Dispute>, ServiceError>;

    async fn get_dispute_for_update_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        dispute_id: Uuid,
    ) -> Result<Dispute, ServiceError>;

    /// Sets the arbitrator if the dispute does not have one yet; keeps the
    /// existing one otherwise.
    async fn assign_arbitrator_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        dispute_id: Uuid,
        arbitrator_id: Uuid,
    ) -> Result<Dispute, ServiceError>;

    async fn update_dispute_status_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        dispute_id: Uuid,
        from: DisputeStatus,
        to: DisputeStatus,
    ) -> Result<Dispute, ServiceError>;

    /// Persist settlement amounts and idempotency key, flip to resolved.
    async fn record_settlement_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        dispute_id: Uuid,
        refund_amount_cents: i64,
        payout_amount_cents: i64,
        resolution_note: String,
        idempotency_key: Option<String>,
    ) -> Result<Dispute, ServiceError>;

    async fn record_rejection_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        dispute_id: Uuid,
        resolution_note: String,
    ) -> Result<Dispute, ServiceError>;
}

#[async_trait]
impl DisputeExt for DBClient {
    async fn create_dispute(
        &self,
        job_instance_id: Uuid,
        raised_by: Uuid,
        reason: String,
    ) -> Result<Dispute, ServiceError> {
        let row = sqlx::query_as::<_, Dispute>(&format!(
            r#"
            INSERT INTO disputes (job_instance_id, raised_by, reason)
            VALUES ($1, $2, $3)
            RETURNING {DISPUTE_COLUMNS}
            "#
        ))
        .bind(job_instance_id)
        .bind(raised_by)
        .bind(reason)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_dispute(&self, dispute_id: Uuid) -> Result<Option<Dispute>, ServiceError> {
        let row = sqlx::query_as::<_, Dispute>(&format!(
            "SELECT {DISPUTE_COLUMNS} FROM disputes WHERE id = $1"
        ))
        .bind(dispute_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_dispute_for_update_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        dispute_id: Uuid,
    ) -> Result<Dispute, ServiceError> {
        sqlx::query_as::<_, Dispute>(&format!(
            "SELECT {DISPUTE_COLUMNS} FROM disputes WHERE id = $1 FOR UPDATE"
        ))
        .bind(dispute_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::DisputeNotFound(dispute_id))
    }

    async fn assign_arbitrator_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        dispute_id: Uuid,
        arbitrator_id: Uuid,
    ) -> Result<Dispute, ServiceError> {
        sqlx::query_as::<_, Dispute>(&format!(
            r#"
            UPDATE disputes
            SET arbitrator_id = COALESCE(arbitrator_id, $2)
            WHERE id = $1
            RETURNING {DISPUTE_COLUMNS}
            "#
        ))
        .bind(dispute_id)
        .bind(arbitrator_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::DisputeNotFound(dispute_id))
    }

    async fn update_dispute_status_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        dispute_id: Uuid,
        from: DisputeStatus,
        to: DisputeStatus,
    ) -> Result<Dispute, ServiceError> {
        sqlx::query_as::<_, Dispute>(&format!(
            r#"
            UPDATE disputes
            SET status = $3
            WHERE id = $1 AND status = $2
            RETURNING {DISPUTE_COLUMNS}
            "#
        ))
        .bind(dispute_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::ConcurrentModification {
            entity: "dispute",
            entity_id: dispute_id,
        })
    }

    async fn record_settlement_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        dispute_id: Uuid,
        refund_amount_cents: i64,
        payout_amount_cents: i64,
        resolution_note: String,
        idempotency_key: Option<String>,
    ) -> Result<Dispute, ServiceError> {
        sqlx::query_as::<_, Dispute>(&format!(
            r#"
            UPDATE disputes
            SET status = 'resolved',
                refund_amount_cents = $2,
                payout_amount_cents = $3,
                resolution_note = $4,
                idempotency_key = $5,
                resolved_at = NOW()
            WHERE id = $1 AND status IN ('open', 'in_review')
            RETURNING {DISPUTE_COLUMNS}
            "#
        ))
        .bind(dispute_id)
        .bind(refund_amount_cents)
        .bind(payout_amount_cents)
        .bind(resolution_note)
        .bind(idempotency_key)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::ConcurrentModification {
            entity: "dispute",
            entity_id: dispute_id,
        })
    }

    async fn record_rejection_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        dispute_id: Uuid,
        resolution_note: String,
    ) -> Result<Dispute, ServiceError> {
        sqlx::query_as::<_, Dispute>(&format!(
            r#"
            UPDATE disputes
            SET status = 'rejected', resolution_note = $2, resolved_at = NOW()
            WHERE id = $1 AND status IN ('open', 'in_review')
            RETURNING {DISPUTE_COLUMNS}
            "#
        ))
        .bind(dispute_id)
        .bind(resolution_note)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::ConcurrentModification {
            entity: "dispute",
            entity_id: dispute_id,
        })
    }
}
