// Application state module
// Immutable per-process state shared by every connection

use std::path::PathBuf;

use super::types::Config;
use crate::handler::Router;

/// Application state
pub struct AppState {
    pub config: Config,
    /// Request router bound to the served directory
    pub router: Router,
    /// Cached `logging.access_log` so the hot path skips the config lookup
    pub access_log: bool,
}

impl AppState {
    /// `served_root` must already be resolved; nothing here touches the
    /// process working directory.
    pub fn new(config: &Config, served_root: PathBuf) -> Self {
        Self {
            config: config.clone(),
            router: Router::new(served_root, config.http.server_name.clone()),
            access_log: config.logging.access_log,
        }
    }
}
