//! Superfície HTTP/WebSocket para dashboards.
//!
//! - `GET /ws` – sessão WebSocket; entra no tópico `telemetry` ao conectar
//! - `GET /api/sensor/current` – leitura atual
//! - `GET /api/sensor/locations` – catálogo de sensores
//! - `GET /api/stats` – contadores do pipeline
//! - `GET /health`
//! - `POST /api/test/simulate`, `/simulate-warning`, `/simulate-emergency` –
//!   injeta um cenário fixo direto no broadcast
//! - `GET /api/test/status` – resumo para a tela de testes
//! - `POST /api/device/command` – texto escrito no dispositivo

use crate::broadcast::{Broadcaster, DEFAULT_TOPIC, SubscriberId, Subscription};
use crate::pipeline::PipelineState;
use crate::simulator::Scenario;
use crate::snapshot::CurrentReading;
use crate::stats::{Stats, StatsSnapshot};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use factory_core::{AlarmEngine, Mode, RecordDecoder, SystemStatus, channels};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub broadcaster: Arc<Broadcaster>,
    pub current: Arc<CurrentReading>,
    pub stats: Arc<Stats>,
    pub pipeline_state: watch::Receiver<PipelineState>,
    /// Mesmas regras do pipeline, usadas nos cenários injetados
    pub engine: Arc<AlarmEngine>,
    pub commands: mpsc::Sender<String>,
    pub cancel: CancellationToken,
}

/// Envelope padrão das respostas JSON.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            timestamp: Utc::now(),
        }
    }

    fn empty(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }
}

/// Comandos aceitos do cliente WebSocket.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ClientCommand {
    Join { topic: String },
    Leave { topic: String },
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/sensor/current", get(current_handler))
        .route("/api/sensor/locations", get(locations_handler))
        .route("/api/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .route("/api/test/simulate", post(simulate_normal))
        .route("/api/test/simulate-warning", post(simulate_warning))
        .route("/api/test/simulate-emergency", post(simulate_emergency))
        .route("/api/test/status", get(test_status_handler))
        .route("/api/device/command", post(command_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve até o token de cancelamento disparar.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let cancel = state.cancel.clone();
    if let Ok(addr) = listener.local_addr() {
        info!("Servidor HTTP/WebSocket ouvindo em {addr}");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            info!("Servidor HTTP encerrando");
        })
        .await
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn current_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.current.latest() {
        Some(reading) => Json(ApiResponse::ok("Leitura atual", reading.as_ref().clone())),
        None => Json(ApiResponse::empty("Nenhuma leitura recebida ainda")),
    }
}

async fn locations_handler() -> impl IntoResponse {
    Json(ApiResponse::ok("Catálogo de sensores", channels::catalog()))
}

/// Contadores do pipeline mais o número de assinantes conectados.
#[derive(Debug, Serialize)]
struct StatsView {
    #[serde(flatten)]
    stats: StatsSnapshot,
    subscribers: usize,
}

async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pipeline_state = *state.pipeline_state.borrow();
    let view = StatsView {
        stats: state.stats.snapshot(pipeline_state),
        subscribers: state.broadcaster.subscriber_count(),
    };
    Json(ApiResponse::ok("Estatísticas", view))
}

// ──────────────────────────────────────────────
// Cenários de teste
// ──────────────────────────────────────────────

async fn simulate_normal(State(state): State<AppState>) -> Response {
    inject(&state, Scenario::Normal)
}

async fn simulate_warning(State(state): State<AppState>) -> Response {
    inject(&state, Scenario::Warning)
}

async fn simulate_emergency(State(state): State<AppState>) -> Response {
    inject(&state, Scenario::Emergency)
}

/// Decodifica e avalia o cenário e publica para os assinantes. A leitura
/// atual e as estatísticas continuam sendo só do pipeline.
fn inject(state: &AppState, scenario: Scenario) -> Response {
    let decoded = match scenario.frame().and_then(|frame| RecordDecoder::new().decode(&frame)) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!("Cenário {scenario} inválido: {e}");
            let body = ApiResponse::<()>::empty(format!("Erro na simulação: {e}"));
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    let reading = state.engine.evaluate(decoded.reading);
    let report = state.broadcaster.publish(DEFAULT_TOPIC, reading.clone());
    info!(
        "Cenário {scenario} injetado para {} assinante(s)",
        report.delivered
    );
    Json(ApiResponse::ok(format!("Cenário {scenario} enviado"), reading)).into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TestStatus {
    system_time: DateTime<Utc>,
    status: SystemStatus,
    mode: Mode,
    pipeline_state: PipelineState,
    connected_clients: usize,
    last_update: Option<DateTime<Utc>>,
    scenarios: [Scenario; 3],
}

async fn test_status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let latest = state.current.latest();
    let view = TestStatus {
        system_time: Utc::now(),
        status: latest.as_ref().map_or(SystemStatus::default(), |r| r.status),
        mode: latest.as_ref().map_or(Mode::default(), |r| r.mode),
        pipeline_state: *state.pipeline_state.borrow(),
        connected_clients: state.broadcaster.subscriber_count(),
        last_update: latest.map(|r| r.timestamp),
        scenarios: Scenario::ALL,
    };
    Json(ApiResponse::ok("Status do sistema", view))
}

async fn command_handler(State(state): State<AppState>, body: String) -> Response {
    if body.is_empty() {
        let reply = ApiResponse::<()>::empty("Comando vazio");
        return (StatusCode::BAD_REQUEST, Json(reply)).into_response();
    }
    match state.commands.try_send(body) {
        Ok(()) => (StatusCode::ACCEPTED, Json(ApiResponse::ok("Comando enfileirado", ()))).into_response(),
        Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
            let reply = ApiResponse::<()>::empty("Dispositivo ocupado ou indisponível");
            (StatusCode::SERVICE_UNAVAILABLE, Json(reply)).into_response()
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let Subscription { id, mut receiver } = state.broadcaster.subscribe();

    loop {
        tokio::select! {
            _ = state.cancel.cancelled() => break,
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => handle_command(&state.broadcaster, id, text.as_str()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            outgoing = receiver.recv() => {
                let Some(message) = outgoing else { break };
                match serde_json::to_string(message.as_ref()) {
                    Ok(json) => {
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Falha ao serializar broadcast: {e}"),
                }
            }
        }
    }

    state.broadcaster.unsubscribe(id);
}

fn handle_command(broadcaster: &Broadcaster, id: SubscriberId, text: &str) {
    match serde_json::from_str::<ClientCommand>(text) {
        Ok(ClientCommand::Join { topic }) => {
            if broadcaster.join(id, &topic) {
                debug!(
                    "Tópico {topic:?} com {} assinante(s)",
                    broadcaster.topic_count(&topic)
                );
            }
        }
        Ok(ClientCommand::Leave { topic }) => {
            broadcaster.leave(id, &topic);
        }
        Err(e) => debug!("Comando WebSocket ignorado de #{id}: {e}"),
    }
}
