use axum::{
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use farmsteam_types::{Document, ReferralOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::store::StoreError;
use crate::Backend;

/// Simple health response for basic liveness checks
#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

/// Detailed health response for monitoring dashboards
#[derive(Serialize)]
struct DetailedHealthResponse {
    healthy: bool,
    users: u64,
    referrals: u64,
    version: &'static str,
}

#[derive(Serialize)]
struct SaveStateResponse {
    ok: bool,
}

#[derive(Serialize)]
struct ReferralResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    already: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bonus: Option<u64>,
}

#[derive(Deserialize)]
pub(super) struct SaveStateRequest {
    user_id: String,
    state: Document,
}

#[derive(Deserialize)]
pub(super) struct ReferralRequest {
    referrer_id: String,
    friend_id: String,
}

/// Basic health check endpoint - always returns ok if the service can
/// respond. Used for load balancer health probes.
pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

/// Detailed health status endpoint for monitoring dashboards.
/// Returns row counts for both tables; a failed count answers 503.
pub(super) async fn health(AxumState(backend): AxumState<Arc<Backend>>) -> Response {
    let status = backend.health_status();
    let response = DetailedHealthResponse {
        healthy: status.healthy,
        users: status.users,
        referrals: status.referrals,
        version: status.version,
    };

    let http_status = if status.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (http_status, Json(response)).into_response()
}

/// Per-endpoint latency snapshot.
pub(super) async fn http_metrics(AxumState(backend): AxumState<Arc<Backend>>) -> Response {
    Json(backend.http_metrics().snapshot()).into_response()
}

/// Merged state for a user. Never fails: any read or parse problem yields
/// the baseline template.
pub(super) async fn get_state(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(user_id): Path<String>,
) -> Response {
    let start = Instant::now();
    let state = backend.store().load_state(&user_id);
    backend.http_metrics().record_get_state(start.elapsed());
    Json(state).into_response()
}

/// Store a complete save document for a user.
pub(super) async fn save_state(
    AxumState(backend): AxumState<Arc<Backend>>,
    Json(request): Json<SaveStateRequest>,
) -> Response {
    let start = Instant::now();
    let result = backend.store().save_state(&request.user_id, &request.state);
    backend.http_metrics().record_save_state(start.elapsed());
    match result {
        Ok(()) => Json(SaveStateResponse { ok: true }).into_response(),
        Err(err) => {
            tracing::error!(user_id = %request.user_id, %err, "state save failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "storage_error").into_response()
        }
    }
}

/// Register a referral and grant the one-time bonus to both parties.
pub(super) async fn register_referral(
    AxumState(backend): AxumState<Arc<Backend>>,
    Json(request): Json<ReferralRequest>,
) -> Response {
    let start = Instant::now();
    let result = backend
        .store()
        .register_referral(&request.referrer_id, &request.friend_id);
    backend
        .http_metrics()
        .record_register_referral(start.elapsed());
    match result {
        Ok(ReferralOutcome::AlreadyRegistered) => Json(ReferralResponse {
            ok: true,
            already: Some(true),
            bonus: None,
        })
        .into_response(),
        Ok(ReferralOutcome::Registered { bonus }) => Json(ReferralResponse {
            ok: true,
            already: None,
            bonus: Some(bonus),
        })
        .into_response(),
        Err(StoreError::SelfReferral) => {
            (StatusCode::BAD_REQUEST, "self_referral").into_response()
        }
        Err(err) => {
            tracing::error!(
                referrer_id = %request.referrer_id,
                friend_id = %request.friend_id,
                %err,
                "referral registration failed"
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "storage_error").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[tokio::test]
    async fn health_answers_503_when_a_count_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("farmsteam.db");
        let backend = Arc::new(Backend::new(Store::open(&path).unwrap()));

        let response = health(AxumState(backend.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);

        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("DROP TABLE referrals;").unwrap();

        let response = health(AxumState(backend)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
