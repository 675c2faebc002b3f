//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use crate::auth::TicketStore;
use crate::config::Config;
use crate::sessions::manager::SessionManager;

/// Shared application state. The bearer token and ticket store are the only
/// process-wide resources (spec.md §9); everything else hangs off the
/// session manager.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration resolved at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started.
    pub start_time: Instant,
    /// Owns all live sessions: id allocation, lookup, list, terminate.
    pub sessions: Arc<SessionManager>,
    /// Single-use short-lived WebSocket upgrade tickets.
    pub tickets: Arc<TicketStore>,
}
