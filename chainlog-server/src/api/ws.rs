//! WebSocket endpoints — snapshot-then-live entry feeds
//!
//! - `GET /ws/logs?subject_id&limit&offset&token` — paginated
//!   `logs_response` snapshot, then live pushes
//! - `GET /ws/stream?subject_id&token` — `initial_logs` snapshot of the
//!   most recent entries, then live pushes
//!
//! Live pushes are bare serialized entries (the same JSON the bus
//! carries). Auth is optional: a `token` query parameter is validated
//! when present, its absence is allowed. The hub subscription is
//! registered before the snapshot is read, so an entry written during
//! connection setup may appear in both — duplicates are permitted,
//! gaps are not.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use shared::error::AppError;
use shared::stream::StreamMessage;
use tokio::sync::mpsc;

use crate::error::ServiceError;
use crate::state::AppState;

/// Snapshot size for `/ws/stream`
const STREAM_SNAPSHOT_LIMIT: usize = 50;

fn default_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct LogsWsQuery {
    pub subject_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamWsQuery {
    pub subject_id: Option<String>,
    pub token: Option<String>,
}

/// GET /ws/logs
pub async fn handle_logs_ws(
    State(state): State<AppState>,
    Query(query): Query<LogsWsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, query.token.as_deref())?;
    Ok(ws.on_upgrade(move |socket| logs_session(socket, state, query)))
}

/// GET /ws/stream
pub async fn handle_stream_ws(
    State(state): State<AppState>,
    Query(query): Query<StreamWsQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, query.token.as_deref())?;
    Ok(ws.on_upgrade(move |socket| stream_session(socket, state, query)))
}

/// A missing token is allowed; a present token must resolve to a live
/// session
fn authorize(state: &AppState, token: Option<&str>) -> Result<(), AppError> {
    match token {
        None => Ok(()),
        Some(token) => match state.sessions.resolve(token) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(AppError::invalid_credentials()),
            Err(e) => Err(ServiceError::from(e).into()),
        },
    }
}

async fn logs_session(socket: WebSocket, state: AppState, query: LogsWsQuery) {
    // Register before reading the snapshot: no write between the two
    // can be missed
    let (conn_id, rx) = state.hub.subscribe(query.subject_id.clone());

    let logs = match state
        .store
        .list(query.subject_id.as_deref(), query.limit, query.offset)
    {
        Ok(logs) => logs,
        Err(e) => {
            tracing::error!(error = %e, "snapshot read failed, closing WS");
            state.hub.unsubscribe(conn_id);
            return;
        }
    };

    let snapshot = StreamMessage::LogsResponse {
        subject_filter: query.subject_id,
        limit: query.limit,
        offset: query.offset,
        count: logs.len(),
        logs,
    };
    run_session(socket, state, conn_id, snapshot, rx).await;
}

async fn stream_session(socket: WebSocket, state: AppState, query: StreamWsQuery) {
    let (conn_id, rx) = state.hub.subscribe(query.subject_id.clone());

    let logs = match state
        .store
        .list(query.subject_id.as_deref(), STREAM_SNAPSHOT_LIMIT, 0)
    {
        Ok(logs) => logs,
        Err(e) => {
            tracing::error!(error = %e, "snapshot read failed, closing WS");
            state.hub.unsubscribe(conn_id);
            return;
        }
    };

    let snapshot = StreamMessage::InitialLogs {
        count: logs.len(),
        subject_filter: query.subject_id,
        logs,
    };
    run_session(socket, state, conn_id, snapshot, rx).await;
}

/// Send the snapshot, then forward queued hub messages until either
/// side closes
async fn run_session(
    socket: WebSocket,
    state: AppState,
    conn_id: u64,
    snapshot: StreamMessage,
    mut rx: mpsc::Receiver<String>,
) {
    let (mut sink, mut stream) = socket.split();

    tracing::info!(conn_id, "stream client connected");

    let send_snapshot = match serde_json::to_string(&snapshot) {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize snapshot");
            state.hub.unsubscribe(conn_id);
            return;
        }
    };
    if send_snapshot.is_err() {
        state.hub.unsubscribe(conn_id);
        return;
    }

    loop {
        tokio::select! {
            queued = rx.recv() => {
                match queued {
                    Some(message) => {
                        if sink.send(Message::Text(message.into())).await.is_err() {
                            break;
                        }
                    }
                    // Hub dropped us (deregistered as dead)
                    None => break,
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    // Inbound frames carry no commands on this protocol
                    _ => {}
                }
            }
        }
    }

    state.hub.unsubscribe(conn_id);
    tracing::info!(conn_id, "stream client disconnected");
}
