use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use skillhub_core::Identity;
use skillhub_core::config::TokenConfig;
use subtle::ConstantTimeEq;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{
    Caller, health_handler, run_fingerprints_handler, run_summaries_handler,
    schedule_fingerprints_handler, schedule_summaries_handler,
};
use super::server::AppState;

#[derive(Clone)]
struct AuthConfig {
    tokens: Arc<[(blake3::Hash, Identity)]>,
}

impl AuthConfig {
    fn new(tokens: &[TokenConfig]) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|t| {
                    (
                        blake3::hash(t.token.as_bytes()),
                        Identity::new(t.name.clone(), t.role),
                    )
                })
                .collect(),
        }
    }

    fn identify(&self, token: &str) -> Option<Identity> {
        // Fixed-length digests so comparison time does not depend on token length.
        let presented = blake3::hash(token.as_bytes());
        let mut found = None;
        for (hash, identity) in &*self.tokens {
            if bool::from(presented.as_bytes().ct_eq(hash.as_bytes())) {
                found = Some(identity.clone());
            }
        }
        found
    }
}

pub(crate) fn build_router(state: AppState, tokens: &[TokenConfig], max_body_size: usize) -> Router {
    let auth_cfg = AuthConfig::new(tokens);

    let admin = Router::new()
        .route("/admin/backfill/summaries/run", post(run_summaries_handler))
        .route(
            "/admin/backfill/summaries/schedule",
            post(schedule_summaries_handler),
        )
        .route(
            "/admin/backfill/fingerprints/run",
            post(run_fingerprints_handler),
        )
        .route(
            "/admin/backfill/fingerprints/schedule",
            post(schedule_fingerprints_handler),
        )
        .layer(middleware::from_fn_with_state(auth_cfg, auth_middleware))
        .layer(RequestBodyLimitLayer::new(max_body_size));

    Router::new()
        .route("/health", get(health_handler))
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Attach the caller matching the bearer token; authorization happens in the service.
async fn auth_middleware(
    axum::extract::State(cfg): axum::extract::State<AuthConfig>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let identity = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .and_then(|token| cfg.identify(token));

    if identity.is_none() {
        tracing::debug!(path = %req.uri().path(), "request without a recognized token");
    }
    req.extensions_mut().insert(Caller(identity));
    next.run(req).await
}
