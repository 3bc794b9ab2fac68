pub mod backup_scheduler;
pub mod cleanup;
pub mod prepare_jobs;
