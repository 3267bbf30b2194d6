// db/jobdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use sqlx::{Postgres, Row, Transaction};

use super::db::DBClient;
use crate::models::jobmodel::*;
use crate::service::error::ServiceError;

const POST_COLUMNS: &str = r#"
    id, client_id, title, description, category,
    scheduled_start, scheduled_end,
    location_address, location_lat, location_lng, geofence_radius_m,
    hourly_rate_cents, total_hours, total_amount_cents,
    platform_fee_percent, platform_fee_cents,
    risk_level, required_trust_level, reserved_caregiver_id,
    status, created_at, updated_at
"#;

const INSTANCE_COLUMNS: &str = r#"
    id, job_post_id, client_id, caregiver_id, status,
    assigned_at, started_at, completed_at, cancelled_at,
    created_at, updated_at
"#;

const ASSIGNMENT_COLUMNS: &str = r#"
    id, job_instance_id, caregiver_id, status, created_at, updated_at
"#;

pub struct NewJobPost {
    pub client_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: CareCategory,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub location_address: String,
    pub location_lat: f64,
    pub location_lng: f64,
    pub geofence_radius_m: Option<i32>,
    pub hourly_rate_cents: i64,
    pub total_hours: i32,
    pub total_amount_cents: i64,
    pub platform_fee_percent: i32,
    pub platform_fee_cents: i64,
    pub risk_level: RiskLevel,
    pub required_trust_level: i32,
    pub reserved_caregiver_id: Option<Uuid>,
}

#[async_trait]
pub trait JobExt {
    // Job posts
    async fn create_job_post(&self, post: NewJobPost) -> Result<JobPost, ServiceError>;

    async fn get_job_post(&self, post_id: Uuid) -> Result<Option<JobPost>, ServiceError>;

    async fn get_job_post_for_update_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        post_id: Uuid,
    ) -> Result<JobPost, ServiceError>;

    /// Status change guarded on the expected current status; zero affected
    /// rows after a locked read means another writer won the race.
    async fn update_post_status_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        post_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<JobPost, ServiceError>;

    async fn list_expirable_post_ids(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, ServiceError>;

    // Job instances
    async fn create_job_instance_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        post: &JobPost,
        caregiver_id: Uuid,
    ) -> Result<JobInstance, ServiceError>;

    async fn get_job_instance(&self, job_id: Uuid) -> Result<Option<JobInstance>, ServiceError>;

    async fn get_job_instance_for_update_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_id: Uuid,
    ) -> Result<JobInstance, ServiceError>;

    async fn get_live_instance_for_post_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        post_id: Uuid,
    ) -> Result<Option<JobInstance>, ServiceError>;

    async fn mark_instance_started_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_id: Uuid,
    ) -> Result<JobInstance, ServiceError>;

    async fn mark_instance_completed_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_id: Uuid,
    ) -> Result<JobInstance, ServiceError>;

    async fn mark_instance_cancelled_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_id: Uuid,
        from: JobStatus,
    ) -> Result<JobInstance, ServiceError>;

    // Assignments
    async fn create_assignment_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_instance_id: Uuid,
        caregiver_id: Uuid,
    ) -> Result<Assignment, ServiceError>;

    async fn get_active_assignment_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_instance_id: Uuid,
    ) -> Result<Option<Assignment>, ServiceError>;

    async fn close_assignment_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        assignment_id: Uuid,
        status: AssignmentStatus,
    ) -> Result<Assignment, ServiceError>;

    /// Does the caregiver already have an active assignment whose schedule
    /// overlaps [start, end)?
    async fn caregiver_has_overlap_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        caregiver_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, ServiceError>;

    // Per-instance timeline (GPS checkpoints, cancellations, settlements)
    async fn insert_job_event_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_instance_id: Uuid,
        event_type: &str,
        actor_id: Option<Uuid>,
        metadata: Option<serde_json::Value>,
    ) -> Result<JobEvent, ServiceError>;

    async fn get_job_events(
        &self,
        job_instance_id: Uuid,
    ) -> Result<Vec<JobEvent>, ServiceError>;
}

#[async_trait]
impl JobExt for DBClient {
    async fn create_job_post(&self, post: NewJobPost) -> Result<JobPost, ServiceError> {
        let row = sqlx::query_as::<_, JobPost>(&format!(
            r#"
            INSERT INTO job_posts
            (client_id, title, description, category,
             scheduled_start, scheduled_end,
             location_address, location_lat, location_lng, geofence_radius_m,
             hourly_rate_cents, total_hours, total_amount_cents,
             platform_fee_percent, platform_fee_cents,
             risk_level, required_trust_level, reserved_caregiver_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(post.client_id)
        .bind(post.title)
        .bind(post.description)
        .bind(post.category)
        .bind(post.scheduled_start)
        .bind(post.scheduled_end)
        .bind(post.location_address)
        .bind(post.location_lat)
        .bind(post.location_lng)
        .bind(post.geofence_radius_m)
        .bind(post.hourly_rate_cents)
        .bind(post.total_hours)
        .bind(post.total_amount_cents)
        .bind(post.platform_fee_percent)
        .bind(post.platform_fee_cents)
        .bind(post.risk_level)
        .bind(post.required_trust_level)
        .bind(post.reserved_caregiver_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_job_post(&self, post_id: Uuid) -> Result<Option<JobPost>, ServiceError> {
        let row = sqlx::query_as::<_, JobPost>(&format!(
            "SELECT {POST_COLUMNS} FROM job_posts WHERE id = $1"
        ))
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_job_post_for_update_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        post_id: Uuid,
    ) -> Result<JobPost, ServiceError> {
        sqlx::query_as::<_, JobPost>(&format!(
            "SELECT {POST_COLUMNS} FROM job_posts WHERE id = $1 FOR UPDATE"
        ))
        .bind(post_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::JobPostNotFound(post_id))
    }

    async fn update_post_status_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        post_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<JobPost, ServiceError> {
        sqlx::query_as::<_, JobPost>(&format!(
            r#"
            UPDATE job_posts
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(post_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::ConcurrentModification {
            entity: "job_post",
            entity_id: post_id,
        })
    }

    async fn list_expirable_post_ids(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, ServiceError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM job_posts
            WHERE status = 'posted' AND scheduled_start < $1
            ORDER BY scheduled_start
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.get::<Uuid, _>("id")).collect())
    }

    async fn create_job_instance_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        post: &JobPost,
        caregiver_id: Uuid,
    ) -> Result<JobInstance, ServiceError> {
        let row = sqlx::query_as::<_, JobInstance>(&format!(
            r#"
            INSERT INTO job_instances (job_post_id, client_id, caregiver_id, status)
            VALUES ($1, $2, $3, 'assigned')
            RETURNING {INSTANCE_COLUMNS}
            "#
        ))
        .bind(post.id)
        .bind(post.client_id)
        .bind(caregiver_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row)
    }

    async fn get_job_instance(&self, job_id: Uuid) -> Result<Option<JobInstance>, ServiceError> {
        let row = sqlx::query_as::<_, JobInstance>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM job_instances WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_job_instance_for_update_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_id: Uuid,
    ) -> Result<JobInstance, ServiceError> {
        sqlx::query_as::<_, JobInstance>(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM job_instances WHERE id = $1 FOR UPDATE"
        ))
        .bind(job_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::JobNotFound(job_id))
    }

    async fn get_live_instance_for_post_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        post_id: Uuid,
    ) -> Result<Option<JobInstance>, ServiceError> {
        let row = sqlx::query_as::<_, JobInstance>(&format!(
            r#"
            SELECT {INSTANCE_COLUMNS} FROM job_instances
            WHERE job_post_id = $1 AND status IN ('assigned', 'in_progress')
            FOR UPDATE
            "#
        ))
        .bind(post_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row)
    }

    async fn mark_instance_started_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_id: Uuid,
    ) -> Result<JobInstance, ServiceError> {
        sqlx::query_as::<_, JobInstance>(&format!(
            r#"
            UPDATE job_instances
            SET status = 'in_progress', started_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'assigned'
            RETURNING {INSTANCE_COLUMNS}
            "#
        ))
        .bind(job_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::ConcurrentModification {
            entity: "job_instance",
            entity_id: job_id,
        })
    }

    async fn mark_instance_completed_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_id: Uuid,
    ) -> Result<JobInstance, ServiceError> {
        sqlx::query_as::<_, JobInstance>(&format!(
            r#"
            UPDATE job_instances
            SET status = 'completed', completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'in_progress'
            RETURNING {INSTANCE_COLUMNS}
            "#
        ))
        .bind(job_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::ConcurrentModification {
            entity: "job_instance",
            entity_id: job_id,
        })
    }

    async fn mark_instance_cancelled_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_id: Uuid,
        from: JobStatus,
    ) -> Result<JobInstance, ServiceError> {
        sqlx::query_as::<_, JobInstance>(&format!(
            r#"
            UPDATE job_instances
            SET status = 'cancelled', cancelled_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {INSTANCE_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(from)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::ConcurrentModification {
            entity: "job_instance",
            entity_id: job_id,
        })
    }

    async fn create_assignment_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_instance_id: Uuid,
        caregiver_id: Uuid,
    ) -> Result<Assignment, ServiceError> {
        let row = sqlx::query_as::<_, Assignment>(&format!(
            r#"
            INSERT INTO assignments (job_instance_id, caregiver_id)
            VALUES ($1, $2)
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        ))
        .bind(job_instance_id)
        .bind(caregiver_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row)
    }

    async fn get_active_assignment_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_instance_id: Uuid,
    ) -> Result<Option<Assignment>, ServiceError> {
        let row = sqlx::query_as::<_, Assignment>(&format!(
            r#"
            SELECT {ASSIGNMENT_COLUMNS} FROM assignments
            WHERE job_instance_id = $1 AND status = 'active'
            FOR UPDATE
            "#
        ))
        .bind(job_instance_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row)
    }

    async fn close_assignment_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        assignment_id: Uuid,
        status: AssignmentStatus,
    ) -> Result<Assignment, ServiceError> {
        sqlx::query_as::<_, Assignment>(&format!(
            r#"
            UPDATE assignments
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        ))
        .bind(assignment_id)
        .bind(status)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ServiceError::ConcurrentModification {
            entity: "assignment",
            entity_id: assignment_id,
        })
    }

    async fn caregiver_has_overlap_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        caregiver_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM assignments a
                JOIN job_instances ji ON ji.id = a.job_instance_id
                JOIN job_posts jp ON jp.id = ji.job_post_id
                WHERE a.caregiver_id = $1
                  AND a.status = 'active'
                  AND ji.status IN ('assigned', 'in_progress')
                  AND jp.scheduled_start < $3
                  AND jp.scheduled_end > $2
            ) AS overlapping
            "#,
        )
        .bind(caregiver_id)
        .bind(start)
        .bind(end)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.get::<bool, _>("overlapping"))
    }

    async fn insert_job_event_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        job_instance_id: Uuid,
        event_type: &str,
        actor_id: Option<Uuid>,
        metadata: Option<serde_json::Value>,
    ) -> Result<JobEvent, ServiceError> {
        let row = sqlx::query_as::<_, JobEvent>(
            r#"
            INSERT INTO job_events (job_instance_id, event_type, actor_id, metadata)
            VALUES ($1, $2, $3, $4)
            RETURNING id, job_instance_id, event_type, actor_id, metadata, created_at
            "#,
        )
        .bind(job_instance_id)
        .bind(event_type)
        .bind(actor_id)
        .bind(metadata)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row)
    }

    async fn get_job_events(
        &self,
        job_instance_id: Uuid,
    ) -> Result<Vec<JobEvent>, ServiceError> {
        let rows = sqlx::query_as::<_, JobEvent>(
            r#"
            SELECT id, job_instance_id, event_type, actor_id, metadata, created_at
            FROM job_events
            WHERE job_instance_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(job_instance_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
