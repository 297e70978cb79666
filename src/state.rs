use dualfm_backend::config::AppConfig;
use dualfm_backend::session::SessionManager;

/// Shared application state / 应用共享状态
pub struct AppState {
    pub config: AppConfig,
    pub sessions: SessionManager,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            sessions: SessionManager::new(),
        }
    }
}
