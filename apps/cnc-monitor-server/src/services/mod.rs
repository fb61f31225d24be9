pub mod job_history;
pub mod live;
pub mod reports;
pub mod state_timeline;
pub mod telemetry;
