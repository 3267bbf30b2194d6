// service/background_jobs.rs
use std::sync::Arc;
use tokio::time::{interval, Duration};

use crate::service::job_service::JobService;

/// Periodic sweep that expires posted jobs whose start time passed without
/// acceptance, releasing the client's publish hold.
pub async fn start_expiry_sweeper(job_service: Arc<JobService>, period_secs: u64) {
    let mut interval = interval(Duration::from_secs(period_secs));

    loop {
        interval.tick().await;

        match job_service.expire_overdue().await {
            Ok(0) => {}
            Ok(count) => tracing::info!("expiry sweep: {} posts expired", count),
            Err(e) => tracing::error!("expiry sweep failed: {}", e),
        }
    }
}
