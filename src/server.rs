//! HTTP and WebSocket surface around the frame pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, PipelineConfig};
use crate::error::Result;
use crate::infer::detector::{RgbFrame, decode_image};
use crate::infer::pipeline::FramePipeline;
use crate::infer::prediction::BoxPrediction;
use crate::inference::InferenceContext;
use crate::models::{self, ModelCatalogEntry, SelectedCatalog};
use crate::protocol::{
    self, ClientMessage, FrameError, ImageFrame, ServerMessage, TensorFrame, check_geometry,
};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, Session>>>,
    pub inference: Arc<InferenceContext>,
    pub pipeline: Arc<FramePipeline>,
    pub config: Arc<AppConfig>,
}

#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub created_at: String,
    pub metrics: SessionMetrics,
}

#[derive(Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub frames_received: u64,
    pub frames_processed: u64,
    pub throttled: u64,
    pub rejected: u64,
    pub boxes_emitted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_compute_ms: Option<f32>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    selected: SelectedCatalog,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    pipeline: PipelineConfig,
    max_fps: u32,
    models: Vec<ModelCatalogEntry>,
    selected: SelectedCatalog,
    #[serde(skip_serializing_if = "Option::is_none")]
    detector: Option<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionResponse {
    session_id: String,
    token: String,
    created_at: String,
}

#[derive(Serialize)]
struct DetectResponse {
    boxes: Vec<BoxPrediction>,
}

/// Drops frames that arrive faster than `max_fps`.
#[derive(Debug)]
pub struct FrameThrottle {
    min_interval: Duration,
    last_frame_at: Option<Instant>,
}

impl FrameThrottle {
    pub fn new(max_fps: u32) -> Self {
        Self { min_interval: Duration::from_millis(1000 / max_fps.max(1) as u64), last_frame_at: None }
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(prev) = self.last_frame_at {
            if now.duration_since(prev) < self.min_interval {
                return false;
            }
        }
        self.last_frame_at = Some(now);
        true
    }
}

/// An outcome the client sees as `{ type: "error", code, message }`.
struct Rejection {
    code: &'static str,
    message: String,
}

impl From<FrameError> for Rejection {
    fn from(err: FrameError) -> Self {
        Rejection { code: err.code(), message: err.to_string() }
    }
}

impl AppState {
    pub fn new(config: AppConfig, inference: InferenceContext) -> Result<Self> {
        let pipeline = FramePipeline::new(&config.pipeline)?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            inference: Arc::new(inference),
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        })
    }

    pub async fn create_session(&self) -> Session {
        let created_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            token: uuid::Uuid::new_v4().to_string(),
            created_at,
            metrics: SessionMetrics::default(),
        };
        self.sessions.write().await.insert(session.id.clone(), session.clone());
        info!("event" = "session.created", session = %session.id);
        session
    }

    async fn record(&self, session_id: &str, update: impl FnOnce(&mut SessionMetrics)) {
        if let Some(s) = self.sessions.write().await.get_mut(session_id) {
            update(&mut s.metrics);
        }
    }

    fn run_tensor_frame(&self, frame: TensorFrame) -> std::result::Result<(Vec<BoxPrediction>, f32), Rejection> {
        check_geometry(&frame.geometry)?;
        let tensor = frame.tensor.into_tensor(self.pipeline.anchor_count())?;
        let started = Instant::now();
        let boxes = self.pipeline.process(&tensor, &frame.geometry);
        Ok((boxes, elapsed_ms(started)))
    }

    fn run_image_frame(&self, frame: &ImageFrame) -> std::result::Result<(Vec<BoxPrediction>, f32), Rejection> {
        let Some(detector) = self.inference.detector.as_ref() else {
            return Err(Rejection { code: "detector-unavailable", message: "no face detector loaded".into() });
        };
        if frame.format != "jpeg" && frame.format != "png" {
            return Err(Rejection { code: "invalid-frame", message: format!("unsupported format {:?}", frame.format) });
        }
        if !frame.display.is_well_formed() {
            return Err(FrameError::Geometry.into());
        }
        let bytes = STANDARD
            .decode(&frame.data)
            .map_err(|e| Rejection { code: "invalid-frame", message: e.to_string() })?;
        let rgb = decode_image(&bytes).map_err(|e| Rejection { code: "invalid-frame", message: e.to_string() })?;
        let started = Instant::now();
        let boxes = RgbFrame::new(rgb.as_raw(), rgb.width(), rgb.height())
            .and_then(|f| self.pipeline.detect(detector.as_ref(), &f, frame.display))
            .map_err(|e| Rejection { code: "detector-failed", message: e.to_string() })?;
        Ok((boxes, elapsed_ms(started)))
    }
}

fn elapsed_ms(started: Instant) -> f32 {
    started.elapsed().as_secs_f32() * 1000.0
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(config))
        .route("/session", post(create_session))
        .route("/session/:id", get(get_session))
        .route("/detect", post(detect))
        .route("/ws", get(ws_upgrade))
        .layer(
            CorsLayer::new()
                .allow_methods(Any)
                .allow_origin(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let body = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        selected: state.inference.selected_models.clone(),
    };
    (StatusCode::OK, Json(body))
}

async fn config(State(state): State<AppState>) -> impl IntoResponse {
    let dir = &state.config.server.models_dir;
    let body = ConfigResponse {
        pipeline: state.config.pipeline,
        max_fps: state.config.server.max_fps,
        models: models::inspect_models_dir(dir),
        selected: state.inference.selected_models.clone(),
        detector: state.inference.detector_name(),
    };
    (StatusCode::OK, Json(body))
}

async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.create_session().await;
    let body = CreateSessionResponse { session_id: session.id, token: session.token, created_at: session.created_at };
    (StatusCode::CREATED, Json(body))
}

async fn get_session(Path(id): Path<String>, State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.read().await;
    match sessions.get(&id).map(serde_json::to_value) {
        Some(Ok(value)) => (StatusCode::OK, Json(value)),
        Some(Err(err)) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": err.to_string() }))),
        None => (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found" }))),
    }
}

async fn detect(State(state): State<AppState>, Json(frame): Json<TensorFrame>) -> Response {
    match state.run_tensor_frame(frame) {
        Ok((boxes, _)) => (StatusCode::OK, Json(DetectResponse { boxes })).into_response(),
        Err(rej) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": rej.code, "message": rej.message })),
        )
            .into_response(),
    }
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let limit = state.config.server.max_message_bytes;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(|socket| handle_socket(socket, state))
}

async fn send(socket: &mut WebSocket, msg: &ServerMessage<'_>) -> bool {
    match serde_json::to_string(msg) {
        Ok(payload) => socket.send(Message::Text(payload)).await.is_ok(),
        Err(err) => {
            warn!("event" = "ws.encode_failed", %err);
            true
        }
    }
}

async fn reject(socket: &mut WebSocket, code: &str, message: &str) -> bool {
    send(socket, &ServerMessage::Error { code, message }).await
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    // Handshake: expect hello first
    let first_text: String = loop {
        match socket.recv().await {
            Some(Ok(Message::Text(t))) => break t,
            Some(Ok(Message::Ping(p))) => { let _ = socket.send(Message::Pong(p)).await; continue; }
            Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(Message::Binary(_))) => {
                reject(&mut socket, "bad-handshake", "expected hello first").await;
                let _ = socket.close().await;
                return;
            }
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => { return; }
        }
    };

    let session_id = match serde_json::from_str::<ClientMessage>(&first_text) {
        Ok(ClientMessage::Hello { session_id, token, client }) => {
            let ok = {
                let sessions = state.sessions.read().await;
                sessions.get(&session_id).map(|s| s.token == token).unwrap_or(false)
            };
            if !ok {
                reject(&mut socket, "unauthorized", "invalid session or token").await;
                let _ = socket.close().await;
                return;
            }
            info!("event" = "ws.hello", session = %session_id, platform = %client.platform, sdk = %client.sdk_version);
            session_id
        }
        _ => {
            warn!("event" = "ws.bad_handshake", "message" = "expected hello");
            reject(&mut socket, "bad-handshake", "expected hello first").await;
            let _ = socket.close().await;
            return;
        }
    };

    let suppression = &state.config.pipeline.suppression;
    let max_fps = state.config.server.max_fps;
    let ack = ServerMessage::HelloAck {
        anchor_count: suppression.anchor_count,
        mode: suppression.mode.as_str(),
        max_fps,
        detector: state.inference.detector_name(),
    };
    if !send(&mut socket, &ack).await { return; }

    let mut throttle = FrameThrottle::new(max_fps);

    while let Some(Ok(message)) = socket.recv().await {
        let (ts, outcome) = match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Hello { .. }) => continue,
                Ok(ClientMessage::Frame(frame)) => {
                    if !admit(&mut socket, &state, &session_id, &mut throttle, max_fps).await { continue; }
                    (frame.ts, state.run_tensor_frame(frame))
                }
                Ok(ClientMessage::Image(frame)) => {
                    if !admit(&mut socket, &state, &session_id, &mut throttle, max_fps).await { continue; }
                    let ts = frame.ts;
                    let worker = state.clone();
                    let outcome = tokio::task::spawn_blocking(move || worker.run_image_frame(&frame))
                        .await
                        .unwrap_or_else(|err| {
                            Err(Rejection { code: "detector-failed", message: err.to_string() })
                        });
                    (ts, outcome)
                }
                Err(err) => {
                    debug!("event" = "ws.bad_message", %err);
                    if !reject(&mut socket, "bad-message", &err.to_string()).await { break; }
                    continue;
                }
            },
            Message::Binary(bytes) => {
                if !admit(&mut socket, &state, &session_id, &mut throttle, max_fps).await { continue; }
                match protocol::decode_binary_frame(&bytes, state.pipeline.anchor_count()) {
                    Ok(frame) => {
                        let started = Instant::now();
                        let boxes = state.pipeline.process(&frame.tensor, &frame.geometry);
                        (frame.ts, Ok((boxes, elapsed_ms(started))))
                    }
                    Err(err) => (0, Err(err.into())),
                }
            }
            Message::Ping(p) => { let _ = socket.send(Message::Pong(p)).await; continue; }
            Message::Pong(_) => continue,
            Message::Close(_) => break,
        };

        let delivered = match outcome {
            Ok((boxes, compute_ms)) => {
                let count = boxes.len() as u64;
                state
                    .record(&session_id, |m| {
                        m.frames_processed += 1;
                        m.boxes_emitted += count;
                        m.last_compute_ms = Some(compute_ms);
                    })
                    .await;
                send(&mut socket, &ServerMessage::FrameAck { ts, boxes, compute_ms }).await
            }
            Err(rej) => {
                state.record(&session_id, |m| m.rejected += 1).await;
                reject(&mut socket, rej.code, &rej.message).await
            }
        };
        if !delivered { break; }
    }
    info!("event" = "ws.closed", session = %session_id);
}

/// Counts the frame and applies the fps limit, answering `throttle` on drop.
async fn admit(
    socket: &mut WebSocket,
    state: &AppState,
    session_id: &str,
    throttle: &mut FrameThrottle,
    max_fps: u32,
) -> bool {
    state.record(session_id, |m| m.frames_received += 1).await;
    if throttle.admit(Instant::now()) {
        return true;
    }
    state.record(session_id, |m| m.throttled += 1).await;
    send(socket, &ServerMessage::Throttle { reason: "fps-limit", max_fps }).await;
    false
}
