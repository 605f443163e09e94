//! `GET /v1/health` — the one route reachable with no authentication at all.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use pincer_kv::KvStoreExt;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    service: &'static str,
    version: &'static str,
    #[serde(rename = "configVersion")]
    config_version: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config_version: String =
        state.store.get_json("meta:version").ok().flatten().unwrap_or_else(|| "1".to_owned());

    Json(HealthResponse {
        ok: true,
        service: "pincer",
        version: env!("CARGO_PKG_VERSION"),
        config_version,
    })
}
