//! REST API
//!
//! TigerStyle: Thin glue over the runtime. Every runtime error maps to one
//! HTTP status in `ApiError::from`.

use crate::models::{ErrorResponse, HealthResponse, OrderSummary};
use crate::state::AppState;
use crate::worker::{SaveOutcome, WORKER_ACTOR_TYPE};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use warren_core::Error;

/// Create the API router with all routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/orders", post(process_order))
        .route("/actors/:actor_type/:id/method/:method", post(invoke_actor))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let runtime = state.runtime();
    let mut actor_types: Vec<String> = runtime
        .dispatcher_handle()
        .registry()
        .type_names()
        .map(str::to_string)
        .collect();
    actor_types.sort();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_actors: runtime.active_actor_count(),
        actor_types,
    })
}

/// Complete an order through its worker actor
///
/// 200 with an empty body when the conditional write succeeds, 400 otherwise.
async fn process_order(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let order: OrderSummary = match serde_json::from_slice(&body) {
        Ok(order) => order,
        Err(e) => {
            warn!(error = %e, "Rejected malformed order");
            return StatusCode::BAD_REQUEST;
        }
    };
    info!(order_id = %order.order_id, "Starting order completion");

    let payload = match serde_json::to_vec(&order.order_id) {
        Ok(payload) => Bytes::from(payload),
        Err(e) => {
            warn!(error = %e, "Failed to encode order id");
            return StatusCode::BAD_REQUEST;
        }
    };

    let result = state
        .runtime()
        .invoke(
            WORKER_ACTOR_TYPE,
            &order.order_id,
            "set_state_with_etag",
            payload,
        )
        .await;

    match result.map(|body| serde_json::from_slice::<SaveOutcome>(&body)) {
        Ok(Ok(SaveOutcome::Success)) => StatusCode::OK,
        Ok(Ok(SaveOutcome::Failed)) => {
            warn!(order_id = %order.order_id, "Order write lost an ETag race");
            StatusCode::BAD_REQUEST
        }
        Ok(Err(e)) => {
            warn!(order_id = %order.order_id, error = %e, "Unreadable worker reply");
            StatusCode::BAD_REQUEST
        }
        Err(e) => {
            warn!(order_id = %order.order_id, error = %e, "Order completion failed");
            StatusCode::BAD_REQUEST
        }
    }
}

/// Invoke any registered method; the body is passed through as the payload
async fn invoke_actor(
    State(state): State<AppState>,
    Path((actor_type, id, method)): Path<(String, String, String)>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let reply = state
        .runtime()
        .invoke(&actor_type, &id, &method, body)
        .await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], reply).into_response())
}

// =============================================================================
// Errors
// =============================================================================

/// API error type that converts to HTTP responses
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    /// HTTP status this error is sent with
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::UnknownActorType { .. } => (StatusCode::NOT_FOUND, "unknown_actor_type"),
            Error::NoSuchMethod { .. } => (StatusCode::NOT_FOUND, "no_such_method"),
            Error::InvalidActorId { .. } | Error::ActorIdTooLong { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_actor_id")
            }
            Error::MessageTooLarge { .. } | Error::StateTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "too_large")
            }
            Error::InvalidSchedule { .. } => (StatusCode::BAD_REQUEST, "invalid_schedule"),
            Error::DeserializationFailed { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::ConcurrencyConflict { .. } => (StatusCode::CONFLICT, "conflict"),
            Error::ActorNotActive { .. } => (StatusCode::CONFLICT, "actor_not_active"),
            Error::StoreUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
            Error::ActorMailboxFull { .. } | Error::ActorCapacityExceeded { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "overloaded")
            }
            Error::RuntimeShutdown => (StatusCode::SERVICE_UNAVAILABLE, "shutting_down"),
            Error::OperationTimedOut { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            Error::ActorActivationFailed { .. }
            | Error::ActorInvocationFailed { .. }
            | Error::InvalidConfiguration { .. }
            | Error::SerializationFailed { .. }
            | Error::Internal { .. }
            | Error::Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        if status.is_server_error() {
            warn!(error = %err, status = status.as_u16(), "Actor call failed");
        }

        Self {
            status,
            body: ErrorResponse::new(code, err.to_string()).retriable(err.is_retriable()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{MyData, WorkerActor};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;
    use warren_runtime::RuntimeBuilder;
    use warren_storage::MemoryStore;

    fn app_with_store() -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let runtime = RuntimeBuilder::new()
            .register_actor(WORKER_ACTOR_TYPE, WorkerActor)
            .with_store(store.clone())
            .build()
            .unwrap();
        (router(AppState::new(runtime)), store)
    }

    fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _store) = app_with_store();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let health: HealthResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.actor_types, vec![WORKER_ACTOR_TYPE.to_string()]);
    }

    #[tokio::test]
    async fn test_order_accepted() {
        let (app, store) = app_with_store();
        let response = app
            .oneshot(post("/orders", r#"{"orderId":"order-1","orderValue":"42"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_bytes(response).await.is_empty());
        assert_eq!(store.state_count().await, 1);
    }

    #[tokio::test]
    async fn test_order_rejected() {
        let (app, _store) = app_with_store();

        let response = app
            .clone()
            .oneshot(post("/orders", "not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(post("/orders", r#"{"orderValue":"42"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // An empty id cannot address an actor
        let response = app
            .oneshot(post("/orders", r#"{"orderId":"","orderValue":"42"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_order_rejected_when_store_down() {
        let (app, store) = app_with_store();
        store.set_available(false);

        let response = app
            .oneshot(post("/orders", r#"{"orderId":"order-2","orderValue":"7"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invoke_round_trip() {
        let (app, _store) = app_with_store();
        let data = MyData {
            property_a: Some("a".into()),
            property_b: None,
        };

        let response = app
            .clone()
            .oneshot(post(
                "/actors/WorkerActor/w-1/method/set_data",
                serde_json::to_vec(&data).unwrap(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(post("/actors/WorkerActor/w-1/method/get_data", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stored: Option<MyData> = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(stored, Some(data));
    }

    #[tokio::test]
    async fn test_invoke_error_statuses() {
        let (app, store) = app_with_store();

        let response = app
            .clone()
            .oneshot(post("/actors/Ghost/g-1/method/get_data", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(error.code, "unknown_actor_type");

        let response = app
            .clone()
            .oneshot(post("/actors/WorkerActor/w-1/method/fly", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Timer callbacks are not part of the public surface
        let response = app
            .clone()
            .oneshot(post(
                "/actors/WorkerActor/w-1/method/on_timer_callback",
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(error.code, "no_such_method");

        let response = app
            .clone()
            .oneshot(post("/actors/WorkerActor/w-1/method/set_data", "{"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        store.set_available(false);
        let response = app
            .oneshot(post("/actors/WorkerActor/w-1/method/get_data", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let error: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(error.retriable);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            ApiError::from(Error::ConcurrencyConflict {
                key: "k".into(),
                expected: "1".into(),
                current: "2".into(),
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(Error::RuntimeShutdown).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(Error::invalid_schedule("r", "bad")).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
