// dtos/jobdtos.rs
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::models::jobmodel::{CareCategory, RiskLevel};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateJobDto {
    #[validate(length(min = 1, max = 255, message = "Title is required"))]
    pub title: String,

    #[validate(length(max = 4000))]
    pub description: String,

    pub category: CareCategory,

    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,

    #[validate(length(max = 512))]
    pub location_address: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub location_lat: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub location_lng: f64,

    #[validate(range(min = 1, max = 100000))]
    pub geofence_radius_m: Option<i32>,

    #[validate(range(min = 1))]
    pub hourly_rate_cents: i64,

    #[validate(range(min = 1, max = 1000))]
    pub total_hours: i32,

    #[validate(range(min = 0, max = 100))]
    pub platform_fee_percent: i32,

    pub risk_level: RiskLevel,

    #[validate(range(min = 0))]
    pub required_trust_level: i32,

    pub reserved_caregiver_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CancelJobDto {
    #[validate(length(min = 1, max = 1000, message = "A cancellation reason is required"))]
    pub reason: String,
}
