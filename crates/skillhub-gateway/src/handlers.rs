use axum::Json;
use axum::body::Bytes;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use skillhub_backfill::BackfillError;
use skillhub_core::{
    AuthError, BackfillService, Identity, RunRequest, ScheduleRequest, ServiceError,
};

use super::server::AppState;

/// The authenticated caller, if the request carried a known bearer token.
#[derive(Debug, Clone, Default)]
pub(crate) struct Caller(pub Option<Identity>);

impl Caller {
    fn identity(&self) -> Option<&Identity> {
        self.0.as_ref()
    }
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

#[derive(serde::Serialize)]
struct ErrorBody {
    ok: bool,
    error: String,
}

pub(crate) enum ApiError {
    BadRequest(String),
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self::Service(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Service(ServiceError::Auth(e @ AuthError::Unauthenticated)) => {
                (StatusCode::UNAUTHORIZED, e.to_string())
            }
            Self::Service(ServiceError::Auth(e @ AuthError::Forbidden { .. })) => {
                (StatusCode::FORBIDDEN, e.to_string())
            }
            Self::Service(ServiceError::Backfill(e @ BackfillError::Incomplete { .. })) => {
                (StatusCode::CONFLICT, e.to_string())
            }
            Self::Service(e) => {
                tracing::error!("backfill request failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_owned())
            }
        };
        (
            status,
            Json(ErrorBody {
                ok: false,
                error: message,
            }),
        )
            .into_response()
    }
}

/// Empty bodies mean "all defaults".
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid body: {e}")))
}

pub(crate) async fn run_summaries_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    BackfillService::authorize(caller.identity())?;
    let request: RunRequest = parse_body(&body)?;
    let response = state
        .service
        .run_summary_backfill(caller.identity(), request)
        .await?;
    Ok(Json(response))
}

pub(crate) async fn schedule_summaries_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    BackfillService::authorize(caller.identity())?;
    let request: ScheduleRequest = parse_body(&body)?;
    let response = state
        .service
        .schedule_summary_backfill(caller.identity(), request)
        .await?;
    Ok(Json(response))
}

pub(crate) async fn run_fingerprints_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    BackfillService::authorize(caller.identity())?;
    let request: RunRequest = parse_body(&body)?;
    let response = state
        .service
        .run_fingerprint_backfill(caller.identity(), request)
        .await?;
    Ok(Json(response))
}

pub(crate) async fn schedule_fingerprints_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    BackfillService::authorize(caller.identity())?;
    let request: ScheduleRequest = parse_body(&body)?;
    let response = state
        .service
        .schedule_fingerprint_backfill(caller.identity(), request)
        .await?;
    Ok(Json(response))
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
