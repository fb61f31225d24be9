use crate::config::MonitorConfig;
use crate::store::SampleStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub config: MonitorConfig,
    pub store: Arc<dyn SampleStore>,
    /// Parent of every live session token; cancelled on shutdown.
    pub shutdown: CancellationToken,
}
