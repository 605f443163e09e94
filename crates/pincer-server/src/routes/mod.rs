//! Route modules and the assembled router.
//!
//! Layer order follows the same split `http-rpc-gateway` uses:
//! `HandleErrorLayer` wraps the fallible layers (`LoadShedLayer`,
//! `ConcurrencyLimitLayer`, `TimeoutLayer`) so the stack as a whole is
//! infallible, then the infallible layers (`CatchPanicLayer`, `TraceLayer`,
//! `RequestBodyLimitLayer`) are applied outside that wrapper.

mod admin;
mod connect;
mod health;
mod runtime;
mod session;
mod static_admin;

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{BoxError, Json, Router};
use tower::limit::ConcurrencyLimitLayer;
use tower::load_shed::LoadShedLayer;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Largest request body this server will buffer before rejecting, in
/// bytes. Individual adapter actions enforce their own (usually much
/// smaller) `maxBodyKb` limit on top of this.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Upper bound on total time spent handling one request, including the
/// egress call an adapter action makes. Per-action `timeoutMs` values are
/// expected to stay well under this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of requests handled concurrently before new ones are
/// shed with `503`.
const MAX_CONCURRENCY: usize = 256;

async fn map_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::GATEWAY_TIMEOUT,
            Json(serde_json::json!({"ok": false, "error": "request_timeout"})),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"ok": false, "error": "overloaded"})),
        )
    }
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({"ok": false, "error": "not_found"})))
}

/// Build the full router over `state`.
pub fn build(state: Arc<AppState>) -> Router {
    let runtime_routes = Router::new()
        .route("/v1/connect", post(connect::connect))
        .route("/v1/adapters", get(runtime::list_adapters))
        .route("/v1/adapters/proposals", post(runtime::submit_proposal))
        .route("/v1/adapter/:adapter/:action", post(runtime::proxy_call));

    let admin_routes = Router::new()
        .route("/v1/admin/bootstrap", get(session::bootstrap_status).post(session::bootstrap))
        .route("/v1/admin/session/login", post(session::login))
        .route("/v1/admin/session/logout", post(session::logout))
        .route("/v1/admin/session/me", get(session::me))
        .route("/v1/admin/doctor", get(admin::doctor))
        .route("/v1/admin/metrics", get(admin::metrics))
        .route("/v1/admin/secrets", get(admin::list_secrets))
        .route("/v1/admin/secrets/:binding", put(admin::put_secret).delete(admin::delete_secret))
        .route("/v1/admin/runtime/rotate", post(admin::rotate_runtime))
        .route("/v1/admin/pairing/generate", post(admin::generate_pairing_code))
        .route("/v1/admin/adapters", get(admin::list_adapters))
        .route("/v1/admin/adapters/proposals", get(admin::list_proposals))
        .route("/v1/admin/adapters/proposals/:id", get(admin::get_proposal))
        .route("/v1/admin/adapters/proposals/:id/reject", post(admin::reject_proposal))
        .route("/v1/admin/adapters/apply", post(admin::apply_adapter))
        .route("/v1/admin/adapters/:id/enable", post(admin::enable_adapter))
        .route("/v1/admin/adapters/:id/disable", post(admin::disable_adapter))
        .route("/v1/admin/audit", get(admin::audit));

    let static_routes = Router::new()
        .route("/admin", get(static_admin::console))
        .route("/admin/bootstrap", get(static_admin::bootstrap_page));

    Router::new()
        .route("/v1/health", get(health::health))
        .merge(runtime_routes)
        .merge(admin_routes)
        .merge(static_routes)
        .fallback(not_found)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(MAX_CONCURRENCY))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}
