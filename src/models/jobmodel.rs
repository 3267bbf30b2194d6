// models/jobmodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "care_category", rename_all = "snake_case")]
pub enum CareCategory {
    ElderCare,
    ChildCare,
    RespiteCare,
    OvernightCare,
    DementiaCare,
    PostSurgicalCare,
    CompanionCare,
    Other,
}

impl CareCategory {
    pub fn to_str(&self) -> &str {
        match self {
            CareCategory::ElderCare => "elder_care",
            CareCategory::ChildCare => "child_care",
            CareCategory::RespiteCare => "respite_care",
            CareCategory::OvernightCare => "overnight_care",
            CareCategory::DementiaCare => "dementia_care",
            CareCategory::PostSurgicalCare => "post_surgical_care",
            CareCategory::CompanionCare => "companion_care",
            CareCategory::Other => "other",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "risk_level", rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Standard,
    High,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    Draft,
    Posted,
    Assigned,
    InProgress,
    Completed,
    Cancelled,
    Expired,
}

impl JobStatus {
    pub fn to_str(&self) -> &str {
        match self {
            JobStatus::Draft => "draft",
            JobStatus::Posted => "posted",
            JobStatus::Assigned => "assigned",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Expired
        )
    }

    /// Exhaustive transition table. Self-transitions are never legal; any
    /// pair absent here is rejected with `InvalidTransition`.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        match (self, to) {
            (JobStatus::Draft, JobStatus::Posted) => true,
            (JobStatus::Posted, JobStatus::Assigned) => true,
            (JobStatus::Posted, JobStatus::Cancelled) => true,
            (JobStatus::Posted, JobStatus::Expired) => true,
            (JobStatus::Assigned, JobStatus::InProgress) => true,
            (JobStatus::Assigned, JobStatus::Cancelled) => true,
            (JobStatus::InProgress, JobStatus::Completed) => true,
            (JobStatus::InProgress, JobStatus::Cancelled) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, sqlx::Type, PartialEq)]
#[sqlx(type_name = "assignment_status", rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobPost {
    pub id: Uuid,
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
    pub status: JobStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobPost {
    /// Everything the client must have funded before the post goes live.
    pub fn total_cost_cents(&self) -> i64 {
        self.total_amount_cents + self.platform_fee_cents
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobInstance {
    pub id: Uuid,
    pub job_post_id: Uuid,
    pub client_id: Uuid,
    pub caregiver_id: Uuid,
    pub status: JobStatus,
    pub assigned_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Assignment {
    pub id: Uuid,
    pub job_instance_id: Uuid,
    pub caregiver_id: Uuid,
    pub status: AssignmentStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobEvent {
    pub id: Uuid,
    pub job_instance_id: Uuid,
    pub event_type: String,
    pub actor_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A raw location fix reported by the caregiver's device at check-in/out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GpsSample {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 7] = [
        JobStatus::Draft,
        JobStatus::Posted,
        JobStatus::Assigned,
        JobStatus::InProgress,
        JobStatus::Completed,
        JobStatus::Cancelled,
        JobStatus::Expired,
    ];

    #[test]
    fn test_happy_path_transitions() {
        assert!(JobStatus::Draft.can_transition_to(JobStatus::Posted));
        assert!(JobStatus::Posted.can_transition_to(JobStatus::Assigned));
        assert!(JobStatus::Assigned.can_transition_to(JobStatus::InProgress));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_cancellation_reachable_from_live_states() {
        assert!(JobStatus::Posted.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Assigned.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Draft.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn test_expiry_only_from_posted() {
        for from in ALL {
            assert_eq!(
                from.can_transition_to(JobStatus::Expired),
                from == JobStatus::Posted
            );
        }
    }

    #[test]
    fn test_self_transitions_rejected() {
        for status in ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.into_iter().filter(JobStatus::is_terminal) {
            for to in ALL {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn test_completed_cannot_reopen() {
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::InProgress));
    }
}
