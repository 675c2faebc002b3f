//! `GET /api/engines` — engine binary discovery (spec.md §4.15, §6).

use axum::Json;

use crate::engines;

pub async fn list() -> Json<Vec<&'static str>> {
    Json(engines::discover())
}
