//! `POST /v1/connect` — a worker trades a one-time pairing code for its
//! runtime key material. The only `/v1/adapter*`-family route that is not
//! signed-request gated, since the worker has no runtime key yet.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ConnectRequest {
    code: String,
}

#[derive(Serialize)]
struct ConnectResponse {
    ok: bool,
    #[serde(rename = "workerUrl")]
    worker_url: String,
    #[serde(rename = "runtimeKey")]
    runtime_key: String,
    #[serde(rename = "hmacSecret")]
    hmac_secret: String,
}

pub async fn connect(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>, AppError> {
    let payload = pincer_auth::consume_pairing_code(state.store, &body.code)?;
    Ok(Json(ConnectResponse {
        ok: true,
        worker_url: payload.worker_url,
        runtime_key: payload.runtime_key,
        hmac_secret: payload.hmac_secret,
    }))
}
