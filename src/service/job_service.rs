// service/job_service.rs
//
// The job lifecycle controller. Each public operation is one atomic unit
// of work: lock the affected rows, re-validate preconditions under the
// lock, apply the transition, let the settlement engine move money, then
// commit. Audit and chat narration run after commit and never abort a
// transition.
use std::sync::Arc;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{
        db::DBClient,
        jobdb::{JobExt, NewJobPost},
        userdb::UserExt,
        walletdb::WalletExt,
    },
    dtos::jobdtos::{CancelJobDto, CreateJobDto},
    models::{
        jobmodel::{
            Assignment, AssignmentStatus, CareCategory, GpsSample, JobInstance, JobPost,
            JobStatus, RiskLevel,
        },
        usermodel::{Actor, CertificationKind, UserRole},
        walletmodel::Wallet,
    },
    service::{
        audit_service::AuditService,
        collaborators::MessagingSink,
        error::{PolicyReason, ServiceError},
        settlement_service::SettlementService,
    },
    utils::{currency, geo},
};

#[derive(Debug, Serialize)]
pub struct JobAcceptResult {
    pub post: JobPost,
    pub instance: JobInstance,
    pub assignment: Assignment,
    pub escrow_wallet: Wallet,
}

#[derive(Debug, Serialize)]
pub struct JobCancelResult {
    pub post: JobPost,
    pub instance: Option<JobInstance>,
    pub refunded_cents: i64,
}

#[derive(Clone)]
pub struct JobService {
    db_client: Arc<DBClient>,
    settlement_service: Arc<SettlementService>,
    audit_service: Arc<AuditService>,
    messaging: Arc<dyn MessagingSink>,
}

impl JobService {
    pub fn new(
        db_client: Arc<DBClient>,
        settlement_service: Arc<SettlementService>,
        audit_service: Arc<AuditService>,
        messaging: Arc<dyn MessagingSink>,
    ) -> Self {
        Self {
            db_client,
            settlement_service,
            audit_service,
            messaging,
        }
    }

    pub async fn create_draft(
        &self,
        actor: Actor,
        dto: CreateJobDto,
    ) -> Result<JobPost, ServiceError> {
        dto.validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;
        if dto.scheduled_end <= dto.scheduled_start {
            return Err(ServiceError::Validation(
                "Schedule must end after it starts".to_string(),
            ));
        }

        let total_amount_cents = currency::job_total_cents(dto.hourly_rate_cents, dto.total_hours);
        let platform_fee_cents =
            currency::platform_fee_cents(total_amount_cents, dto.platform_fee_percent);

        let post = self
            .db_client
            .create_job_post(NewJobPost {
                client_id: actor.id,
                title: dto.title,
                description: dto.description,
                category: dto.category,
                scheduled_start: dto.scheduled_start,
                scheduled_end: dto.scheduled_end,
                location_address: dto.location_address,
                location_lat: dto.location_lat,
                location_lng: dto.location_lng,
                geofence_radius_m: dto.geofence_radius_m,
                hourly_rate_cents: dto.hourly_rate_cents,
                total_hours: dto.total_hours,
                total_amount_cents,
                platform_fee_percent: dto.platform_fee_percent,
                platform_fee_cents,
                risk_level: dto.risk_level,
                required_trust_level: dto.required_trust_level,
                reserved_caregiver_id: dto.reserved_caregiver_id,
            })
            .await?;

        self.audit_service
            .record(
                "job_post",
                post.id,
                "create_draft",
                None,
                Some("draft"),
                Some(actor.id),
                None,
            )
            .await;

        Ok(post)
    }

    /// Going live costs money up front: the full job cost is held on the
    /// client's wallet before anyone can see the post.
    pub async fn publish(&self, job_post_id: Uuid, actor: Actor) -> Result<JobPost, ServiceError> {
        let db = self.db_client.clone();
        let settlement = self.settlement_service.clone();

        let post = self
            .db_client
            .with_tx(move |tx| {
                Box::pin(async move {
                    let post = db.get_job_post_for_update_tx(tx, job_post_id).await?;
                    if post.client_id != actor.id {
                        return Err(ServiceError::Unauthorized {
                            actor_id: actor.id,
                            entity_id: post.id,
                        });
                    }
                    ensure_transition(post.id, post.status, JobStatus::Posted)?;

                    settlement.hold_for_publish(tx, &post).await?;

                    db.update_post_status_tx(tx, post.id, JobStatus::Draft, JobStatus::Posted)
                        .await
                })
            })
            .await?;

        self.audit_service
            .log_job_transition(
                &actor,
                "job_post",
                post.id,
                "publish",
                "draft",
                "posted",
                Some(json!({ "held_cents": post.total_cost_cents() })),
            )
            .await;

        Ok(post)
    }

    /// Acceptance is the big bang: instance, assignment and escrow wallet
    /// come into existence together, and the job cost moves into escrow,
    /// all in one unit of work.
    pub async fn accept(
        &self,
        job_post_id: Uuid,
        actor: Actor,
    ) -> Result<JobAcceptResult, ServiceError> {
        let db = self.db_client.clone();
        let settlement = self.settlement_service.clone();

        let result = self
            .db_client
            .with_tx(move |tx| {
                Box::pin(async move {
                    let post = db.get_job_post_for_update_tx(tx, job_post_id).await?;
                    ensure_transition(post.id, post.status, JobStatus::Assigned)?;

                    if actor.role != UserRole::Caregiver {
                        return Err(ServiceError::PolicyViolation(PolicyReason::NotACaregiver));
                    }
                    if let Some(reserved) = post.reserved_caregiver_id {
                        if reserved != actor.id {
                            return Err(ServiceError::PolicyViolation(
                                PolicyReason::ReservedForAnotherCaregiver,
                            ));
                        }
                    }

                    let trust_level = db.get_trust_level(actor.id).await?;
                    if trust_level < post.required_trust_level {
                        return Err(ServiceError::PolicyViolation(PolicyReason::TrustLevelTooLow));
                    }
                    for kind in required_certifications(post.risk_level, post.category) {
                        if !db.has_verified_certification(actor.id, kind).await? {
                            return Err(ServiceError::PolicyViolation(
                                PolicyReason::MissingCertification,
                            ));
                        }
                    }
                    if db
                        .caregiver_has_overlap_tx(
                            tx,
                            actor.id,
                            post.scheduled_start,
                            post.scheduled_end,
                        )
                        .await?
                    {
                        return Err(ServiceError::PolicyViolation(PolicyReason::ScheduleConflict));
                    }

                    let instance = db.create_job_instance_tx(tx, &post, actor.id).await?;
                    let assignment = db.create_assignment_tx(tx, instance.id, actor.id).await?;
                    let escrow_wallet = db.create_escrow_wallet_tx(tx, instance.id).await?;

                    settlement
                        .fund_acceptance(tx, &post, &instance, escrow_wallet.id)
                        .await?;

                    let post = db
                        .update_post_status_tx(tx, post.id, JobStatus::Posted, JobStatus::Assigned)
                        .await?;
                    db.insert_job_event_tx(
                        tx,
                        instance.id,
                        "accepted",
                        Some(actor.id),
                        Some(json!({ "caregiver_id": actor.id })),
                    )
                    .await?;

                    // Re-read under the same lock so callers see the funded balance.
                    let escrow_wallet = db.get_wallet_for_update_tx(tx, escrow_wallet.id).await?;

                    Ok(JobAcceptResult {
                        post,
                        instance,
                        assignment,
                        escrow_wallet,
                    })
                })
            })
            .await?;

        self.audit_service
            .log_job_transition(
                &actor,
                "job_instance",
                result.instance.id,
                "accept",
                "posted",
                "assigned",
                Some(json!({
                    "escrow_wallet_id": result.escrow_wallet.id,
                    "escrowed_cents": result.escrow_wallet.held_balance,
                })),
            )
            .await;
        self.narrate(result.instance.id, "Caregiver accepted the job; funds are in escrow.")
            .await;

        Ok(result)
    }

    pub async fn check_in(
        &self,
        job_id: Uuid,
        actor: Actor,
        gps: Option<GpsSample>,
    ) -> Result<JobInstance, ServiceError> {
        // Unlocked peek to learn the owning post, then lock post before
        // instance (the fixed order everywhere) and re-validate.
        let peek = self
            .db_client
            .get_job_instance(job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))?;
        let post_id = peek.job_post_id;

        let db = self.db_client.clone();

        let instance = self
            .db_client
            .with_tx(move |tx| {
                Box::pin(async move {
                    let post = db.get_job_post_for_update_tx(tx, post_id).await?;
                    let instance = db.get_job_instance_for_update_tx(tx, job_id).await?;
                    ensure_transition(instance.id, instance.status, JobStatus::InProgress)?;

                    let assignment = db
                        .get_active_assignment_tx(tx, instance.id)
                        .await?
                        .ok_or(ServiceError::AssignmentNotFound(instance.id))?;
                    if assignment.caregiver_id != actor.id {
                        return Err(ServiceError::Unauthorized {
                            actor_id: actor.id,
                            entity_id: instance.id,
                        });
                    }

                    let metadata = checkpoint_metadata("check_in", &post, gps.as_ref())?;

                    let instance = db.mark_instance_started_tx(tx, instance.id).await?;
                    db.update_post_status_tx(
                        tx,
                        post.id,
                        JobStatus::Assigned,
                        JobStatus::InProgress,
                    )
                    .await?;
                    db.insert_job_event_tx(
                        tx,
                        instance.id,
                        "gps_check_in",
                        Some(actor.id),
                        Some(metadata),
                    )
                    .await?;

                    Ok(instance)
                })
            })
            .await?;

        self.audit_service
            .log_job_transition(
                &actor,
                "job_instance",
                instance.id,
                "check_in",
                "assigned",
                "in_progress",
                gps.map(|s| json!({ "lat": s.latitude, "lng": s.longitude, "accuracy_m": s.accuracy_m })),
            )
            .await;

        Ok(instance)
    }

    /// Completing the job settles the escrow. Calling it again on an
    /// already-completed job returns the terminal state instead of erroring.
    pub async fn check_out(
        &self,
        job_id: Uuid,
        actor: Actor,
        gps: Option<GpsSample>,
    ) -> Result<JobInstance, ServiceError> {
        let peek = self
            .db_client
            .get_job_instance(job_id)
            .await?
            .ok_or(ServiceError::JobNotFound(job_id))?;
        let post_id = peek.job_post_id;

        let db = self.db_client.clone();
        let settlement = self.settlement_service.clone();

        let (instance, replayed) = self
            .db_client
            .with_tx(move |tx| {
                Box::pin(async move {
                    let post = db.get_job_post_for_update_tx(tx, post_id).await?;
                    let instance = db.get_job_instance_for_update_tx(tx, job_id).await?;

                    if instance.status == JobStatus::Completed {
                        return Ok((instance, true));
                    }
                    ensure_transition(instance.id, instance.status, JobStatus::Completed)?;

                    let assignment = db
                        .get_active_assignment_tx(tx, instance.id)
                        .await?
                        .ok_or(ServiceError::AssignmentNotFound(instance.id))?;
                    if assignment.caregiver_id != actor.id {
                        return Err(ServiceError::Unauthorized {
                            actor_id: actor.id,
                            entity_id: instance.id,
                        });
                    }

                    let metadata = checkpoint_metadata("check_out", &post, gps.as_ref())?;

                    let instance = db.mark_instance_completed_tx(tx, instance.id).await?;
                    db.close_assignment_tx(tx, assignment.id, AssignmentStatus::Completed)
                        .await?;
                    db.update_post_status_tx(
                        tx,
                        post.id,
                        JobStatus::InProgress,
                        JobStatus::Completed,
                    )
                    .await?;

                    settlement.split_completion(tx, &post, &instance).await?;

                    db.insert_job_event_tx(
                        tx,
                        instance.id,
                        "gps_check_out",
                        Some(actor.id),
                        Some(metadata),
                    )
                    .await?;

                    Ok((instance, false))
                })
            })
            .await?;

        if !replayed {
            self.audit_service
                .log_job_transition(
                    &actor,
                    "job_instance",
                    instance.id,
                    "check_out",
                    "in_progress",
                    "completed",
                    None,
                )
                .await;
            self.narrate(instance.id, "Job completed; escrow released to the caregiver.")
                .await;
        }

        Ok(instance)
    }

    /// Legal from posted, assigned or in_progress; the client, the active
    /// caregiver or an admin may cancel. Repeating a cancel is a no-op.
    pub async fn cancel(
        &self,
        job_post_id: Uuid,
        actor: Actor,
        dto: CancelJobDto,
    ) -> Result<JobCancelResult, ServiceError> {
        dto.validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;
        let reason = dto.reason;

        let db = self.db_client.clone();
        let settlement = self.settlement_service.clone();

        let (result, replayed) = self
            .db_client
            .with_tx(move |tx| {
                Box::pin(async move {
                    let post = db.get_job_post_for_update_tx(tx, job_post_id).await?;

                    if post.status == JobStatus::Cancelled {
                        return Ok((
                            JobCancelResult {
                                post,
                                instance: None,
                                refunded_cents: 0,
                            },
                            true,
                        ));
                    }
                    ensure_transition(post.id, post.status, JobStatus::Cancelled)?;

                    let instance = db.get_live_instance_for_post_tx(tx, post.id).await?;
                    let assignment = match &instance {
                        Some(inst) => db.get_active_assignment_tx(tx, inst.id).await?,
                        None => None,
                    };

                    let is_assignee = assignment
                        .as_ref()
                        .map_or(false, |a| a.caregiver_id == actor.id);
                    if post.client_id != actor.id && !actor.is_admin() && !is_assignee {
                        return Err(ServiceError::Unauthorized {
                            actor_id: actor.id,
                            entity_id: post.id,
                        });
                    }

                    let refunded_cents = match &instance {
                        // Never accepted: undo the publish hold in place.
                        None => {
                            settlement.refund_before_acceptance(tx, &post).await?;
                            post.total_cost_cents()
                        }
                        // Accepted: drain whatever the escrow still holds.
                        Some(inst) => settlement
                            .refund_after_acceptance(tx, &post, inst)
                            .await?
                            .map(|row| row.amount)
                            .unwrap_or(0),
                    };

                    let cancelled_instance = match &instance {
                        Some(inst) => {
                            if let Some(a) = &assignment {
                                db.close_assignment_tx(tx, a.id, AssignmentStatus::Cancelled)
                                    .await?;
                            }
                            let cancelled =
                                db.mark_instance_cancelled_tx(tx, inst.id, inst.status).await?;
                            db.insert_job_event_tx(
                                tx,
                                inst.id,
                                "cancelled",
                                Some(actor.id),
                                Some(json!({ "reason": reason })),
                            )
                            .await?;
                            Some(cancelled)
                        }
                        None => None,
                    };

                    let post = db
                        .update_post_status_tx(tx, post.id, post.status, JobStatus::Cancelled)
                        .await?;

                    Ok((
                        JobCancelResult {
                            post,
                            instance: cancelled_instance,
                            refunded_cents,
                        },
                        false,
                    ))
                })
            })
            .await?;

        if !replayed {
            self.audit_service
                .record(
                    "job_post",
                    result.post.id,
                    "cancel",
                    None,
                    Some("cancelled"),
                    Some(actor.id),
                    Some(json!({ "refunded_cents": result.refunded_cents })),
                )
                .await;
            if let Some(instance) = &result.instance {
                self.narrate(instance.id, "Job cancelled; escrow refunded to the client.")
                    .await;
            }
        }

        Ok(result)
    }

    /// A posted job whose start time passed without acceptance expires and
    /// gives the client their hold back. Driven by the background sweep.
    pub async fn expire(&self, job_post_id: Uuid) -> Result<JobPost, ServiceError> {
        let db = self.db_client.clone();
        let settlement = self.settlement_service.clone();

        let (post, replayed) = self
            .db_client
            .with_tx(move |tx| {
                Box::pin(async move {
                    let post = db.get_job_post_for_update_tx(tx, job_post_id).await?;
                    if post.status == JobStatus::Expired {
                        return Ok((post, true));
                    }
                    ensure_transition(post.id, post.status, JobStatus::Expired)?;

                    settlement.release_on_expiry(tx, &post).await?;

                    let post = db
                        .update_post_status_tx(tx, post.id, JobStatus::Posted, JobStatus::Expired)
                        .await?;
                    Ok((post, false))
                })
            })
            .await?;

        if !replayed {
            self.audit_service
                .record(
                    "job_post",
                    post.id,
                    "expire",
                    Some("posted"),
                    Some("expired"),
                    None,
                    Some(json!({ "released_cents": post.total_cost_cents() })),
                )
                .await;
        }

        Ok(post)
    }

    /// One sweep pass; returns how many posts were expired.
    pub async fn expire_overdue(&self) -> Result<usize, ServiceError> {
        let ids = self.db_client.list_expirable_post_ids(Utc::now()).await?;
        let mut expired = 0;
        for id in ids {
            match self.expire(id).await {
                Ok(_) => expired += 1,
                Err(e) => tracing::warn!(job_post_id = %id, "expiry sweep skipped post: {}", e),
            }
        }
        Ok(expired)
    }

    async fn narrate(&self, job_id: Uuid, text: &str) {
        if let Err(e) = self.messaging.post_system_message(job_id, text).await {
            tracing::warn!(job_id = %job_id, "system message failed (swallowed): {}", e);
        }
    }
}

fn ensure_transition(job_id: Uuid, from: JobStatus, to: JobStatus) -> Result<(), ServiceError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ServiceError::InvalidTransition { job_id, from, to })
    }
}

/// Validate an optional GPS sample against the job site and build the
/// checkpoint event payload.
fn checkpoint_metadata(
    checkpoint: &str,
    post: &JobPost,
    gps: Option<&GpsSample>,
) -> Result<serde_json::Value, ServiceError> {
    let Some(sample) = gps else {
        return Ok(json!({ "checkpoint": checkpoint }));
    };

    let distance_m = geo::check_geofence(
        post.location_lat,
        post.location_lng,
        sample.latitude,
        sample.longitude,
        post.geofence_radius_m,
        sample.accuracy_m,
    )
    .map_err(|(distance_m, allowed_m)| ServiceError::GeofenceViolation {
        distance_m,
        allowed_m,
    })?;

    Ok(json!({
        "checkpoint": checkpoint,
        "lat": sample.latitude,
        "lng": sample.longitude,
        "accuracy_m": sample.accuracy_m,
        "distance_m": distance_m.round() as i64,
    }))
}

/// Which verified certifications a caregiver needs before accepting.
pub fn required_certifications(risk: RiskLevel, category: CareCategory) -> Vec<CertificationKind> {
    let mut required = Vec::new();
    match category {
        CareCategory::DementiaCare => required.push(CertificationKind::DementiaSpecialist),
        CareCategory::PostSurgicalCare => required.push(CertificationKind::RegisteredNurse),
        _ => {}
    }
    if risk == RiskLevel::High {
        required.push(CertificationKind::FirstAid);
    }
    required
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_transition_accepts_table_entries() {
        let id = Uuid::new_v4();
        assert!(ensure_transition(id, JobStatus::Draft, JobStatus::Posted).is_ok());
        assert!(ensure_transition(id, JobStatus::InProgress, JobStatus::Completed).is_ok());
    }

    #[test]
    fn test_ensure_transition_rejects_everything_else() {
        let id = Uuid::new_v4();
        let err = ensure_transition(id, JobStatus::Completed, JobStatus::InProgress).unwrap_err();
        match err {
            ServiceError::InvalidTransition { job_id, from, to } => {
                assert_eq!(job_id, id);
                assert_eq!(from, JobStatus::Completed);
                assert_eq!(to, JobStatus::InProgress);
            }
            other => panic!("expected InvalidTransition, got {:?}", other),
        }
    }

    #[test]
    fn test_required_certifications_low_risk() {
        assert!(required_certifications(RiskLevel::Low, CareCategory::CompanionCare).is_empty());
        assert!(required_certifications(RiskLevel::Standard, CareCategory::ElderCare).is_empty());
    }

    #[test]
    fn test_required_certifications_by_category() {
        assert_eq!(
            required_certifications(RiskLevel::Standard, CareCategory::DementiaCare),
            vec![CertificationKind::DementiaSpecialist]
        );
        assert_eq!(
            required_certifications(RiskLevel::Standard, CareCategory::PostSurgicalCare),
            vec![CertificationKind::RegisteredNurse]
        );
    }

    #[test]
    fn test_high_risk_requires_first_aid() {
        assert_eq!(
            required_certifications(RiskLevel::High, CareCategory::ElderCare),
            vec![CertificationKind::FirstAid]
        );
        assert_eq!(
            required_certifications(RiskLevel::High, CareCategory::DementiaCare),
            vec![
                CertificationKind::DementiaSpecialist,
                CertificationKind::FirstAid
            ]
        );
    }

    #[test]
    fn test_checkpoint_metadata_rejects_out_of_fence_sample() {
        let post = fixture_post(Some(500));
        // ~1200m north of the site with 10m accuracy: allowance is 510.
        let sample = GpsSample {
            latitude: 0.01078,
            longitude: 0.0,
            accuracy_m: 10.0,
        };
        let err = checkpoint_metadata("check_in", &post, Some(&sample)).unwrap_err();
        match err {
            ServiceError::GeofenceViolation {
                distance_m,
                allowed_m,
            } => {
                assert_eq!(allowed_m, 510);
                assert!((1195..=1205).contains(&distance_m), "got {}", distance_m);
            }
            other => panic!("expected GeofenceViolation, got {:?}", other),
        }
    }

    #[test]
    fn test_checkpoint_metadata_without_sample_is_ok() {
        let post = fixture_post(None);
        let metadata = checkpoint_metadata("check_out", &post, None).unwrap();
        assert_eq!(metadata["checkpoint"], "check_out");
    }

    fn fixture_post(geofence_radius_m: Option<i32>) -> JobPost {
        JobPost {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            title: "Overnight care".to_string(),
            description: String::new(),
            category: CareCategory::ElderCare,
            scheduled_start: Utc::now(),
            scheduled_end: Utc::now(),
            location_address: String::new(),
            location_lat: 0.0,
            location_lng: 0.0,
            geofence_radius_m,
            hourly_rate_cents: 100,
            total_hours: 10,
            total_amount_cents: 1000,
            platform_fee_percent: 10,
            platform_fee_cents: 100,
            risk_level: RiskLevel::Standard,
            required_trust_level: 0,
            reserved_caregiver_id: None,
            status: JobStatus::Assigned,
            created_at: None,
            updated_at: None,
        }
    }
}
