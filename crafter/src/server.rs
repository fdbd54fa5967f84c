//! REST + WebSocket control surface.
//!
//! Thin by design: handlers translate HTTP into engine commands and config
//! store calls, and the WebSocket forwards the event bus verbatim. No
//! crafting decisions are made here.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;

use grid::{Point, Rect};
use mods::{DICTIONARY, Language};

use crate::config::{Config, ConfigStore};
use crate::driver::{InputDriver, TooltipReader};
use crate::engine::EngineHandle;
use crate::error::CraftError;
use crate::events::{Event, EventBus};

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub bus: EventBus,
    pub store: Arc<ConfigStore>,
    pub input: Arc<dyn InputDriver>,
    pub reader: Arc<dyn TooltipReader>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/craft/start", post(craft_start))
        .route("/api/craft/pause", post(craft_pause))
        .route("/api/craft/stop", post(craft_stop))
        .route("/api/craft/status", get(craft_status))
        .route("/api/config", get(get_config).post(set_config))
        .route("/api/mod-templates", get(mod_templates))
        .route("/api/wizard/capture", post(wizard_capture))
        .route("/api/wizard/validate-tooltip", post(wizard_validate_tooltip))
        .route("/api/wizard/parse-mod", post(wizard_parse_mod))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn run(addr: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, "control surface listening");
    axum::serve(listener, router(state)).await.context("serve")
}

fn craft_error_response(err: CraftError) -> Response {
    let status = match &err {
        CraftError::AlreadyRunning | CraftError::InvalidTransition { .. } => StatusCode::CONFLICT,
        CraftError::Uncalibrated(_) | CraftError::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

async fn craft_start(State(state): State<AppState>) -> Response {
    match state.engine.start().await {
        Ok(()) => Json(json!({ "status": "started" })).into_response(),
        Err(err) => craft_error_response(err),
    }
}

async fn craft_pause(State(state): State<AppState>) -> Response {
    match state.engine.pause_toggle().await {
        Ok(new_state) => Json(json!({ "status": new_state.to_string() })).into_response(),
        Err(err) => craft_error_response(err),
    }
}

async fn craft_stop(State(state): State<AppState>) -> Response {
    match state.engine.stop().await {
        Ok(()) => Json(json!({ "status": "stopped" })).into_response(),
        Err(err) => craft_error_response(err),
    }
}

async fn craft_status(State(state): State<AppState>) -> Response {
    match state.engine.status().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => craft_error_response(err),
    }
}

async fn get_config(State(state): State<AppState>) -> Response {
    match state.store.get() {
        Some(cfg) => Json(cfg).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no config found" })),
        )
            .into_response(),
    }
}

async fn set_config(State(state): State<AppState>, Json(cfg): Json<Config>) -> Response {
    match state.store.set(cfg) {
        Ok(()) => Json(json!({ "status": "saved" })).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "config save failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

/// Built-in mod table for the target-entry UI.
async fn mod_templates() -> Response {
    let templates: Vec<_> = DICTIONARY
        .iter()
        .map(|def| {
            json!({
                "key": def.key,
                "name": def.name(Language::English),
                "nameZh": def.name(Language::SimplifiedChinese),
                "example": def.example,
            })
        })
        .collect();
    Json(templates).into_response()
}

#[derive(Deserialize)]
struct CaptureRequest {
    field: String,
}

const CAPTURE_COUNTDOWN_SECS: u32 = 5;

/// Start a position capture: count down over the event stream, then report
/// wherever the cursor is. The response returns immediately; the result
/// arrives as a `capture_result` event.
async fn wizard_capture(
    State(state): State<AppState>,
    Json(req): Json<CaptureRequest>,
) -> Response {
    let bus = state.bus.clone();
    let input = Arc::clone(&state.input);
    let field = req.field;

    tokio::spawn(async move {
        for seconds_left in (1..=CAPTURE_COUNTDOWN_SECS).rev() {
            bus.emit(Event::CaptureCountdown {
                seconds_left,
                field: field.clone(),
            });
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        match tokio::task::spawn_blocking(move || input.cursor_position()).await {
            Ok(Ok(pos)) => bus.emit(Event::CaptureResult {
                field,
                x: pos.x,
                y: pos.y,
            }),
            Ok(Err(err)) => tracing::warn!(error = %err, %field, "cursor capture failed"),
            Err(err) => tracing::warn!(error = %err, %field, "cursor capture task failed"),
        }
    });

    Json(json!({ "status": "capturing" })).into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidateTooltipRequest {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    #[serde(default)]
    game_language: Language,
}

/// Read the candidate tooltip rectangle once and report whether it yields
/// plausible text lines.
async fn wizard_validate_tooltip(
    State(state): State<AppState>,
    Json(req): Json<ValidateTooltipRequest>,
) -> Response {
    let region = Rect::new(Point::new(req.x1, req.y1), Point::new(req.x2, req.y2));
    if region.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "tooltip rectangle has no area" })),
        )
            .into_response();
    }

    let reader = Arc::clone(&state.reader);
    let language = req.game_language;
    let text = match tokio::task::spawn_blocking(move || reader.read_region(region, language)).await
    {
        Ok(Ok(text)) => text,
        Ok(Err(err)) => return craft_error_response(CraftError::Driver(err)),
        Err(err) => return craft_error_response(CraftError::Driver(anyhow::Error::new(err))),
    };

    // Three characters or fewer is recognition static, not a mod line.
    let valid_lines = text.lines().filter(|l| l.trim().len() > 3).count();
    Json(json!({
        "success": valid_lines > 0,
        "validLines": valid_lines,
        "ocrText": text,
    }))
    .into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParseModRequest {
    input: String,
    #[serde(default)]
    game_language: Language,
}

async fn wizard_parse_mod(Json(req): Json<ParseModRequest>) -> Response {
    match mods::parse_target_mod(&req.input, req.game_language) {
        Ok(target) => Json(target).into_response(),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| ws_session(socket, state))
}

/// Push the current state, then forward bus events until either side hangs
/// up. A subscriber that lags simply misses the overwritten events.
async fn ws_session(socket: WebSocket, state: AppState) {
    let mut events = state.bus.subscribe();
    let (mut sink, mut stream) = socket.split();

    if let Ok(snapshot) = state.engine.status().await {
        let hello = Event::StateChange { state: snapshot.state };
        if send_event(&mut sink, &hello).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if send_event(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "websocket subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send_event(
    sink: &mut (impl SinkExt<Message> + Unpin),
    event: &Event,
) -> Result<(), ()> {
    let json = serde_json::to_string(event).map_err(|_| ())?;
    sink.send(Message::Text(json)).await.map_err(|_| ())
}
