use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use packman_arcade::config::SessionConfig;
use packman_arcade::score_board::{ScoreBoard, SharedScoreBoard};
use packman_arcade::server_protocol::{parse_client_message, ParsedClientMessage};
use packman_arcade::server_utils::{parse_score_limit, parse_seed, sanitize_name};
use packman_arcade::session::Session;
use packman_arcade::types::SessionPhase;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
struct AppState {
    config: Arc<SessionConfig>,
    scores: SharedScoreBoard,
    fixed_seed: Option<u32>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

/// One connected client and the game it owns.
struct ClientSession {
    client_id: String,
    session: Session,
    tx: mpsc::Sender<OutboundMessage>,
    disconnected: bool,
}

type SharedClient = Arc<Mutex<ClientSession>>;

#[derive(Debug, Deserialize)]
struct ScoresQuery {
    limit: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let score_path = std::env::var("SCORE_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".data/scores.json"));

    let config = match std::env::var("SESSION_CONFIG_PATH") {
        Ok(raw) => SessionConfig::from_json_file(&raw)
            .with_context(|| format!("failed to load session config from {raw}"))?,
        Err(_) => SessionConfig::default(),
    };
    config.validate().context("invalid session config")?;
    let fixed_seed = parse_seed(std::env::var("SESSION_SEED").ok().as_deref());

    let state = AppState {
        config: Arc::new(config),
        scores: SharedScoreBoard::new(ScoreBoard::new(score_path)),
        fixed_seed,
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/scores", get(scores_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        info!(root = %static_dir.to_string_lossy(), "serving static files");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("static file root not found; only the API and websocket are served");
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    info!(port, "listening");
    axum::serve(listener, app)
        .await
        .context("server runtime failed")?;
    Ok(())
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    let candidates = [PathBuf::from("dist/client"), PathBuf::from("static")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn scores_handler(
    State(state): State<AppState>,
    Query(query): Query<ScoresQuery>,
) -> impl IntoResponse {
    match state
        .scores
        .build_response(parse_score_limit(query.limit.as_deref()))
    {
        Some(response) => (StatusCode::OK, Json(json!(response))),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "score board unavailable" })),
        ),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    let seed = state
        .fixed_seed
        .unwrap_or_else(|| rand::rng().random::<u32>());
    let session = match Session::new(state.config.as_ref().clone().with_seed(seed)) {
        Ok(session) => session,
        Err(err) => {
            warn!(client = %client_id, error = %err, "failed to create session");
            let _ = tx.try_send(OutboundMessage::Close {
                code: 1011,
                reason: "session unavailable".to_string(),
            });
            drop(tx);
            let _ = writer.await;
            return;
        }
    };

    let mut client = ClientSession {
        client_id: client_id.clone(),
        session,
        tx: tx.clone(),
        disconnected: false,
    };
    client
        .session
        .set_score_submitter(Box::new(state.scores.clone()));
    info!(client = %client_id, seed, "session started");
    send_initial_state(&mut client, seed);

    let tick_ms = state.config.tick_ms;
    let client: SharedClient = Arc::new(Mutex::new(client));
    let ticker = start_tick_loop(client.clone(), tick_ms);

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(&client, raw.as_str()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(&client, &text).await;
                } else {
                    send_error(&mut *client.lock().await, "invalid utf8 message");
                }
            }
            Message::Close(_) => break,
            _ => {}
        }

        if client.lock().await.disconnected {
            break;
        }
    }

    ticker.abort();
    {
        let mut guard = client.lock().await;
        guard.session.quit();
        info!(
            client = %guard.client_id,
            score = guard.session.score(),
            level = guard.session.level(),
            "client disconnected"
        );
    }
    drop(tx);
    drop(client);
    let _ = writer.await;
}

async fn handle_client_message(client: &SharedClient, raw: &str) {
    let mut guard = client.lock().await;
    let Some(message) = parse_client_message(raw) else {
        send_error(&mut guard, "invalid message");
        return;
    };

    match message {
        ParsedClientMessage::Hello { name } => {
            let name = sanitize_name(&name);
            guard.session.set_identity(name.clone());
            debug!(client = %guard.client_id, name = ?name, "hello");
            let payload = json!({
                "type": "welcome",
                "clientId": guard.client_id,
                "name": name,
            });
            send_to_client(&mut guard, &payload, QueuePolicy::DisconnectOnFull);
        }
        ParsedClientMessage::Input { dir } => guard.session.set_input(dir),
        ParsedClientMessage::Pause => {
            guard.session.pause();
            send_state(&mut guard, QueuePolicy::DisconnectOnFull);
        }
        ParsedClientMessage::Resume => {
            guard.session.resume();
            send_state(&mut guard, QueuePolicy::DisconnectOnFull);
        }
        ParsedClientMessage::TogglePause => {
            guard.session.toggle_pause();
            send_state(&mut guard, QueuePolicy::DisconnectOnFull);
        }
        ParsedClientMessage::PlayAgain => {
            if guard.session.phase() != SessionPhase::GameOver {
                send_error(&mut guard, "game is not over");
                return;
            }
            guard.session.play_again();
            send_state(&mut guard, QueuePolicy::DisconnectOnFull);
        }
        ParsedClientMessage::Quit => {
            guard.session.quit();
            send_state(&mut guard, QueuePolicy::DisconnectOnFull);
            let _ = guard.tx.try_send(OutboundMessage::Close {
                code: 1000,
                reason: "quit".to_string(),
            });
            guard.disconnected = true;
        }
        ParsedClientMessage::Ping { t } => {
            send_to_client(
                &mut guard,
                &json!({
                    "type": "pong",
                    "t": t,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }
}

fn send_initial_state(client: &mut ClientSession, seed: u32) {
    let maze = client.session.maze_init();
    let config = client.session.config().clone();
    let payload = json!({
        "type": "session_init",
        "clientId": client.client_id,
        "seed": seed,
        "maze": maze,
        "config": config,
    });
    send_to_client(client, &payload, QueuePolicy::DisconnectOnFull);
    send_state(client, QueuePolicy::DisconnectOnFull);
}

fn start_tick_loop(client: SharedClient, tick_ms: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
        loop {
            interval.tick().await;
            let mut guard = client.lock().await;
            if guard.disconnected || guard.session.phase() == SessionPhase::Quit {
                break;
            }
            if guard.session.is_paused() || guard.session.phase() == SessionPhase::GameOver {
                continue;
            }
            guard.session.step(tick_ms);
            send_state(&mut guard, QueuePolicy::DropOnFull);
        }
    })
}

fn send_state(client: &mut ClientSession, policy: QueuePolicy) {
    let snapshot = client.session.build_snapshot(true);
    send_to_client(
        client,
        &json!({
            "type": "state",
            "snapshot": snapshot,
        }),
        policy,
    );
}

fn send_error(client: &mut ClientSession, message: &str) {
    send_to_client(
        client,
        &json!({
            "type": "error",
            "message": message,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn send_to_client(client: &mut ClientSession, message: &Value, policy: QueuePolicy) {
    let send_failed = client
        .tx
        .try_send(OutboundMessage::Text(message.to_string()))
        .is_err();
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        warn!(client = %client.client_id, "outbound queue full; disconnecting");
        client.disconnected = true;
    }
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client(capacity: usize) -> (ClientSession, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        let session = Session::new(SessionConfig::default()).expect("default session");
        (
            ClientSession {
                client_id: make_id("client"),
                session,
                tx,
                disconnected: false,
            },
            rx,
        )
    }

    #[test]
    fn make_id_is_sequential_per_prefix() {
        let first = make_id("client");
        let second = make_id("client");
        assert!(first.starts_with("client_"));
        assert_ne!(first, second);
    }

    #[test]
    fn full_queue_disconnects_only_when_policy_requires() {
        let (mut client, _rx) = test_client(1);
        send_state(&mut client, QueuePolicy::DropOnFull);
        send_state(&mut client, QueuePolicy::DropOnFull);
        assert!(!client.disconnected);
        send_error(&mut client, "boom");
        assert!(client.disconnected);
    }

    #[test]
    fn initial_state_sends_maze_then_snapshot() {
        let (mut client, mut rx) = test_client(8);
        send_initial_state(&mut client, 7);
        let Ok(OutboundMessage::Text(first)) = rx.try_recv() else {
            panic!("expected session_init");
        };
        let Ok(OutboundMessage::Text(second)) = rx.try_recv() else {
            panic!("expected state");
        };
        let first: Value = serde_json::from_str(&first).expect("json");
        let second: Value = serde_json::from_str(&second).expect("json");
        assert_eq!(first["type"], "session_init");
        assert_eq!(first["seed"], 7);
        assert_eq!(first["maze"]["cols"], 19);
        assert_eq!(second["type"], "state");
        assert_eq!(second["snapshot"]["level"], 1);
    }
}
