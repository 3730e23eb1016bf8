use std::sync::Arc;

use retrack_core::{Config, Reconciler, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    engine: Arc<Reconciler>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<Reconciler>) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn engine(&self) -> &Arc<Reconciler> {
        &self.engine
    }
}
