pub mod audit_service;
pub mod background_jobs;
pub mod collaborators;
pub mod dispute_service;
pub mod error;
pub mod job_service;
pub mod settlement_service;
