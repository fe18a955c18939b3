//! HTTP surface: telemetry ingest and the telephony webhook.
//!
//! Ingest validates and stores a telemetry event, then fans out the
//! `telemetry-ingested` signal that triggers the anomaly stage. The
//! entry point is deliberately thin — everything downstream is driven
//! by the bus.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::bus::{publish_json, topics, MessageBus};
use crate::store::DocumentStore;
use crate::telephony::webhook::{self, WebhookState};
use crate::types::{mint_id, TelemetryEvent};

/// Shared state for the ingest handlers.
pub struct ApiState {
    pub store: DocumentStore,
    pub bus: Arc<dyn MessageBus>,
}

/// Full application router: ingest, health, webhook.
pub fn router(api: Arc<ApiState>, webhook: Arc<WebhookState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/ingest_telemetry", post(ingest_telemetry))
        .route("/healthz", get(healthz))
        .with_state(api)
        .merge(webhook::router(webhook))
        .layer(cors)
}

async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

fn bad_request(error: &str, details: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": error, "details": details.to_string()})),
    )
        .into_response()
}

/// `POST /ingest_telemetry` — validate, store, fan out.
async fn ingest_telemetry(
    State(state): State<Arc<ApiState>>,
    Json(mut body): Json<Value>,
) -> Response {
    let Some(fields) = body.as_object_mut() else {
        return bad_request("Invalid JSON body", "expected an object");
    };
    // Generate the event key when the sender didn't supply one.
    let supplied = fields
        .get("event_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    if supplied.is_none() {
        fields.insert("event_id".to_string(), Value::String(mint_id("evt")));
    }

    let event: TelemetryEvent = match serde_json::from_value(body.clone()) {
        Ok(event) => event,
        Err(e) => return bad_request("Validation failed", e),
    };

    let event = match state.store.insert_telemetry(event) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "Telemetry insert failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Internal server error", "details": e.to_string()})),
            )
                .into_response();
        }
    };

    // Fan-out: the ingested signal carries only the correlating keys.
    let signal = json!({
        "event_id": event.event_id,
        "vehicle_id": event.vehicle_id,
        "timestamp": event.timestamp_utc.to_rfc3339(),
    });
    if let Err(e) = publish_json(state.bus.as_ref(), topics::TELEMETRY_INGESTED, &signal).await {
        error!(event_id = %event.event_id, error = %e, "Ingest fan-out publish failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "Internal server error", "details": e.to_string()})),
        )
            .into_response();
    }

    info!(event_id = %event.event_id, vehicle_id = %event.vehicle_id, "Telemetry ingested");
    (
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "event_id": event.event_id,
            "message": "Telemetry data stored successfully",
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;
    use tower::ServiceExt;

    fn test_router() -> (Router, DocumentStore, Arc<InProcessBus>) {
        let store = DocumentStore::temporary().unwrap();
        let bus = Arc::new(InProcessBus::new());
        let api = Arc::new(ApiState {
            store: store.clone(),
            bus: bus.clone(),
        });
        let webhook = Arc::new(WebhookState {
            store: store.clone(),
            bus: bus.clone(),
            base_url: String::new(),
        });
        (router(api, webhook), store, bus)
    }

    fn ingest_request(body: Value) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri("/ingest_telemetry")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn sample_body() -> Value {
        json!({
            "vehicle_id": "MH-07-AB-1234",
            "timestamp_utc": "2024-12-15T10:30:45Z",
            "gps_lat": 19.0760,
            "gps_lon": 72.8777,
            "speed_kmph": 60.5,
            "odometer_km": 45230.5,
            "engine_rpm": 2500.0,
            "engine_coolant_temp_c": 115.0,
            "battery_soc_pct": 85.0,
            "battery_soh_pct": 92.0,
            "dtc_codes": ["P0301"],
        })
    }

    #[tokio::test]
    async fn ingest_generates_event_id_and_fans_out() {
        let (app, store, bus) = test_router();
        let mut ingested = bus.subscribe(topics::TELEMETRY_INGESTED);

        let response = app.oneshot(ingest_request(sample_body())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let reply: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(reply["status"], "success");
        let event_id = reply["event_id"].as_str().unwrap().to_string();
        assert!(event_id.starts_with("evt_"));

        // Stored and immutable thereafter.
        assert!(store.get_telemetry(&event_id).unwrap().is_some());

        // Fan-out signal carries the correlating keys.
        let payload = ingested.recv().await.unwrap();
        let signal: Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(signal["event_id"], event_id.as_str());
        assert_eq!(signal["vehicle_id"], "MH-07-AB-1234");
        assert!(signal["timestamp"].is_string());
    }

    #[tokio::test]
    async fn ingest_keeps_supplied_event_id() {
        let (app, store, _bus) = test_router();
        let mut body = sample_body();
        body["event_id"] = json!("evt_custom_0001");
        let response = app.oneshot(ingest_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(store.get_telemetry("evt_custom_0001").unwrap().is_some());
    }

    #[tokio::test]
    async fn ingest_rejects_invalid_body() {
        let (app, _store, _bus) = test_router();
        let response = app
            .oneshot(ingest_request(json!({"vehicle_id": "V1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cors_preflight_is_supported() {
        let (app, _store, _bus) = test_router();
        let request = axum::http::Request::builder()
            .method("OPTIONS")
            .uri("/ingest_telemetry")
            .header("origin", "https://fleet.example")
            .header("access-control-request-method", "POST")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert!(response.status().is_success());
        assert!(response
            .headers()
            .contains_key("access-control-allow-origin"));
    }
}
