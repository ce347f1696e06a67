//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{RoomRegistry, SessionSettings};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<RoomRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Initialize room registry
        let registry = Arc::new(RoomRegistry::new(SessionSettings {
            grace_period: config.room_grace_period,
        }));

        Self { config, registry }
    }
}
