use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{OriginalUri, Path, Query, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::{Duration, Instant, timeout};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::{
    engine::InboundEvent,
    errors::AppError,
    polling::QrPollEvent,
    reconcile::ReconcileScope,
    repo::InstanceRecord,
    state::AppState,
};

/// How long instance creation waits for the first pairing code before
/// answering without one.
const QR_WAIT: Duration = Duration::from_millis(300);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateInstanceRequest {
    owner_id: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ReconcileRequest {
    #[serde(default)]
    owner_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct RootResponse {
    name: String,
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangedResponse {
    changed: bool,
}

/// Builds the root HTTP router.
pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    Router::new()
        .route("/", get(root_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/instance/create", post(create_instance_handler))
        .route("/instance", get(list_instances_handler))
        .route("/instance/connectionState/:id", get(connection_state_handler))
        .route("/instance/sync/:id", post(sync_instance_handler))
        .route("/instance/:id", delete(delete_instance_handler))
        .route("/webhook/session", post(webhook_handler))
        .route("/reconcile", post(reconcile_handler))
        .fallback(not_implemented_handler)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(state: &AppState) -> CorsLayer {
    let methods = state
        .config
        .cors
        .methods
        .iter()
        .filter_map(|method| Method::from_bytes(method.as_bytes()).ok())
        .collect::<Vec<_>>();

    let layer = CorsLayer::new().allow_methods(methods);
    let layer = if state.config.cors.credentials {
        layer.allow_credentials(true)
    } else {
        layer
    };

    if state.config.cors.origins.iter().any(|origin| origin == "*") {
        layer.allow_origin(Any)
    } else {
        let origins = state
            .config
            .cors
            .origins
            .iter()
            .filter_map(|origin| HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>();
        layer.allow_origin(origins)
    }
}

async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(RootResponse {
        name: state.config.server.name.clone(),
        status: "ok",
    })
}

async fn healthz_handler() -> impl IntoResponse {
    Json(HealthResponse { ok: true })
}

async fn readyz_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, Json(HealthResponse { ok: true })).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse { ok: false })).into_response()
    }
}

async fn create_instance_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateInstanceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let record = state.engine.create_instance(&request.owner_id).await?;

    // Give the first poll a moment to land so fast servers answer with a
    // scannable code straight away.
    if let Some(events) = state.engine.subscribe_polling(record.id) {
        wait_for_qr_event(events, QR_WAIT).await;
    }

    let record = state
        .engine
        .get_instance(record.id)
        .await?
        .unwrap_or(record);

    Ok((StatusCode::CREATED, Json(instance_payload(&record))))
}

async fn list_instances_handler(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let owner = query.get("ownerId").map(String::as_str);
    let instances = state.engine.list_instances(owner).await?;
    let payload: Vec<_> = instances.iter().map(instance_payload).collect();
    Ok(Json(payload))
}

async fn connection_state_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .engine
        .get_instance(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("instance {id} not found")))?;

    Ok(Json(json!({
        "instanceId": record.id,
        "connectionStatus": record.connection_status,
        "externalStatusRaw": record.external_status_raw,
    })))
}

async fn sync_instance_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let changed = state.engine.sync_instance(id).await?;
    Ok(Json(ChangedResponse { changed }))
}

async fn delete_instance_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.engine.delete_instance(id).await?;
    Ok(Json(json!({ "status": 200, "message": "Instance deleted" })))
}

async fn webhook_handler(
    State(state): State<AppState>,
    Json(event): Json<InboundEvent>,
) -> Result<impl IntoResponse, AppError> {
    let changed = state.engine.ingest_event(event).await?;
    Ok(Json(ChangedResponse { changed }))
}

async fn reconcile_handler(
    State(state): State<AppState>,
    Json(request): Json<ReconcileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let scope = match request.owner_id {
        Some(owner) => ReconcileScope::Owner(owner),
        None => ReconcileScope::Global,
    };
    let report = state.engine.reconcile(scope).await?;
    Ok(Json(report))
}

async fn not_implemented_handler(uri: OriginalUri) -> AppError {
    AppError::not_implemented(format!("route {} is not implemented", uri.0.path()))
}

fn instance_payload(record: &InstanceRecord) -> serde_json::Value {
    json!({
        "instanceId": record.id,
        "externalSessionId": record.external_session_id,
        "ownerId": record.owner_id,
        "phone": record.phone,
        "phoneUnconfirmed": record.phone_unconfirmed,
        "connectionStatus": record.connection_status,
        "qrCode": record.qr_code,
        "profileName": record.profile_name,
        "dateConnected": record.date_connected,
        "dateDisconnected": record.date_disconnected,
    })
}

async fn wait_for_qr_event(
    mut events: tokio::sync::broadcast::Receiver<QrPollEvent>,
    max_wait: Duration,
) {
    let deadline = Instant::now() + max_wait;

    loop {
        let now = Instant::now();
        if now >= deadline {
            return;
        }

        let remaining = deadline.saturating_duration_since(now);
        match timeout(remaining, events.recv()).await {
            Ok(Ok(QrPollEvent::Success { .. })) => return,
            Ok(Ok(_)) => continue,
            Ok(Err(_)) => return,
            Err(_) => return,
        }
    }
}
