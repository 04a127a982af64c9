//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::relay::{RelayHandle, RelayHub};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub relay: RelayHandle,
}

impl AppState {
    /// Build state around a fresh relay hub. The caller spawns the hub.
    pub fn new(config: Config) -> (Self, RelayHub) {
        let (hub, relay) = RelayHub::new(config.relay.clone());
        let state = Self {
            config: Arc::new(config),
            relay,
        };
        (state, hub)
    }
}
