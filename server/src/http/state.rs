use rest_store::Transport;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub transport: Arc<dyn Transport>,
}
