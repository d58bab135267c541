use crate::session::SessionController;
use crate::settings::SettingsStore;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The recorder driven by the UI's start/stop controls
    pub controller: SessionController,

    /// Language and voice preferences per party
    pub settings: Arc<SettingsStore>,
}

impl AppState {
    pub fn new(controller: SessionController, settings: Arc<SettingsStore>) -> Self {
        Self {
            controller,
            settings,
        }
    }
}
