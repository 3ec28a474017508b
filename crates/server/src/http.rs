//! HTTP payload API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Banner |
//! | `GET` | `/health` | Liveness probe |
//! | `POST` | `/tests/{test_id}` | Store a test's first payload (basic auth) |
//! | `GET` | `/tests/{test_id}` | Read a test's payload (basic auth) |
//!
//! Errors are JSON bodies of the form `{"code": 409, "error": "..."}`.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde::Serialize;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use testsync_core::{Error, TestId};

use crate::auth::require_basic_auth;
use crate::AppState;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Requests taking longer than this are aborted.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    let tests = Router::new()
        .route(
            "/tests/{test_id}",
            get(read_test_data).post(create_test_data),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_basic_auth,
        ));

    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .merge(tests)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    code: u16,
    error: String,
}

/// JSON error with a matching status code.
pub fn error_response(status: StatusCode, msg: impl Into<String>) -> impl IntoResponse {
    (
        status,
        Json(ErrorBody {
            code: status.as_u16(),
            error: msg.into(),
        }),
    )
}

/// Parse the `{test_id}` path segment, answering 400 on failure.
pub(crate) fn parse_test_id(raw: &str) -> Result<TestId, Response> {
    raw.parse::<TestId>().map_err(|_| {
        debug!(target: "testsync::http", test_id = raw, "Invalid test ID");
        error_response(
            StatusCode::BAD_REQUEST,
            format!("Unable to parse testID as int: invalid integer {raw:?}"),
        )
        .into_response()
    })
}

/// `GET /`
async fn banner() -> &'static str {
    "testsync, ready to share data.\n"
}

/// `GET /health`
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /tests/{test_id}`: store the body as the test's first payload.
async fn create_test_data(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Response {
    let test_id = match parse_test_id(&raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.service().create_data(test_id, &body) {
        Ok(_) => {
            info!(target: "testsync::http", test_id = %test_id, bytes = body.len(), "Set data for test");
            (StatusCode::OK, body).into_response()
        }
        Err(Error::TestExists(_)) => {
            error_response(StatusCode::CONFLICT, "Provided test already has set data")
                .into_response()
        }
        Err(e) => {
            error!(target: "testsync::http", test_id = %test_id, error = %e, "Could not store data");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not store data")
                .into_response()
        }
    }
}

/// `GET /tests/{test_id}`: return the test's payload.
async fn read_test_data(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    let test_id = match parse_test_id(&raw_id) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.service().read_data(test_id) {
        Ok(data) => {
            debug!(target: "testsync::http", test_id = %test_id, bytes = data.len(), "Reading data for test");
            (StatusCode::OK, data).into_response()
        }
        Err(Error::TestNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "Could not find test").into_response()
        }
        Err(e) => {
            error!(target: "testsync::http", test_id = %test_id, error = %e, "Could not read data");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Could not read data")
                .into_response()
        }
    }
}
