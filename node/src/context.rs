//! Shared services handed to every node component at construction.

use std::path::PathBuf;
use std::sync::Arc;

use crate::{EventBus, NodeConfig, NodeMetrics, ShutdownController};

/// Built once per node and passed to each constructor; there is no
/// process-wide registry of services.
#[derive(Clone)]
pub struct ServiceContext {
    pub config: Arc<NodeConfig>,
    pub shutdown: Arc<ShutdownController>,
    pub events: Arc<EventBus>,
    pub metrics: Arc<NodeMetrics>,
}

impl ServiceContext {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: Arc::new(ShutdownController::new()),
            events: Arc::new(EventBus::new()),
            metrics: Arc::new(NodeMetrics::new()),
        }
    }

    /// `name` resolved against the data directory.
    pub fn resolve_path(&self, name: &str) -> PathBuf {
        self.config.data_dir.join(name)
    }
}
