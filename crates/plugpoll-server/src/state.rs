use std::sync::Arc;

use crate::registry::Registry;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    /// Also handed to the poller as its sink.
    pub registry: Arc<Registry>,
}
