//! Unauthenticated health-check endpoint (spec.md §6): `GET /healthz`.

use axum::Json;
use serde_json::{json, Value};

/// Always reachable, no auth, no state — suitable for a load-balancer probe.
pub async fn healthz() -> Json<Value> {
    Json(json!({"ok": true}))
}
