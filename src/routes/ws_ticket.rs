//! `POST /api/ws-ticket` — mints a single-use WebSocket upgrade ticket
//! (spec.md §4.10, §6). Bearer-authenticated like every other `/api/*` route.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::auth::TICKET_TTL;
use crate::AppState;

#[derive(Serialize)]
pub struct TicketResponse {
    ticket: String,
    expires_ms: u64,
}

/// `expires_ms` is the absolute unix-epoch millisecond the ticket stops
/// validating, not a duration — matching the prior implementation's
/// `exp.UnixMilli()`. The ticket store tracks expiry against its own
/// monotonic clock; this is wall-clock-derived for the wire response only.
pub async fn issue(State(state): State<AppState>) -> Json<TicketResponse> {
    let (ticket, _expires_at) = state.tickets.issue().await;
    let expires_ms = (SystemTime::now() + TICKET_TTL)
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Json(TicketResponse { ticket, expires_ms })
}
