//! Connection handlers for the Parley server.
//!
//! This module owns the session lifecycle: upgrade, handshake, the inbound
//! event loop, and cleanup.

use crate::api;
use crate::config::Config;
use crate::metrics::{self, SessionMetricsGuard};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures_util::StreamExt;
use parley_core::{
    FanoutError, FanoutReport, MemoryStore, MessageFanoutService, Session, SessionId, UserId,
};
use parley_protocol::{codes, ClientEvent, Encoding, ServerEvent};
use parley_transport::websocket::{pump_outbound, FrameDecoder};
use parley_transport::{Inbound, SessionHub};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Persists and pushes messages.
    pub fanout: MessageFanoutService<MemoryStore, SessionHub>,
    /// Outbound queues of live sessions.
    pub hub: Arc<SessionHub>,
    /// The backing store, shared with `fanout`.
    pub store: Arc<MemoryStore>,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state over an empty store.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Create new app state over an existing store.
    #[must_use]
    pub fn with_store(config: Config, store: Arc<MemoryStore>) -> Self {
        let hub = Arc::new(SessionHub::with_capacity(
            config.transport.session_queue_capacity,
        ));
        let fanout =
            MessageFanoutService::with_config(Arc::clone(&store), Arc::clone(&hub), config.fanout());

        Self {
            fanout,
            hub,
            store,
            config,
        }
    }
}

/// Build the HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .merge(api::routes())
        .with_state(state)
}

/// Serve `state` on an already bound listener.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the seed file is invalid or the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    if let Some(path) = &config.store.seed {
        crate::seed::Seed::from_file(path)?
            .apply(&state.store)
            .await?;
    }

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Parley server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    serve(listener, state).await
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handshake parameters carried on the upgrade request.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketParams {
    /// The connecting user. Absent or empty leaves the session unregistered.
    pub user_id: Option<String>,
    /// `json` (default) or `msgpack`.
    pub encoding: Option<String>,
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<SocketParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let encoding = match params.encoding.as_deref() {
        None => Encoding::default(),
        Some(name) => match name.parse::<Encoding>() {
            Ok(encoding) => encoding,
            Err(e) => {
                metrics::record_error("handshake");
                return (StatusCode::BAD_REQUEST, format!("{e}")).into_response();
            }
        },
    };

    let user = params
        .user_id
        .filter(|id| !id.is_empty())
        .map(UserId::from);

    ws.max_message_size(state.config.transport.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, user, encoding))
}

/// Handle a WebSocket connection.
async fn handle_websocket(
    socket: WebSocket,
    state: Arc<AppState>,
    user: Option<UserId>,
    encoding: Encoding,
) {
    let _metrics_guard = SessionMetricsGuard::new();

    let session_id = SessionId::generate();
    let mut session = state.fanout.open_session(session_id.clone());
    let outbound = state.hub.attach(session_id.clone());

    // Queued before the handshake so it precedes any push.
    reply(
        &state,
        &session_id,
        ServerEvent::Connected {
            session_id: session_id.to_string(),
            user_id: user.as_ref().map(ToString::to_string),
        },
    );
    session.handshake(user);
    metrics::set_users_online(state.fanout.online_count());

    debug!(session = %session_id, user = ?session.user(), ?encoding, "WebSocket connected");

    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(pump_outbound(sink, outbound, encoding));
    let mut writer_done = false;
    let mut decoder = FrameDecoder::new(state.config.transport.max_message_size);

    loop {
        tokio::select! {
            result = &mut writer => {
                writer_done = true;
                match result {
                    Ok(Ok(())) => debug!(session = %session_id, "Writer finished"),
                    Ok(Err(e)) => {
                        warn!(session = %session_id, error = %e, "Writer failed");
                        metrics::record_error("websocket");
                    }
                    Err(e) => error!(session = %session_id, error = %e, "Writer task panicked"),
                }
                break;
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(message)) => match decoder.decode(message) {
                        Ok(Inbound::Events(events)) => {
                            for event in events {
                                handle_event(event, &session, &state).await;
                            }
                        }
                        Ok(Inbound::Close) => {
                            debug!(session = %session_id, "Received close frame");
                            break;
                        }
                        Ok(Inbound::Control) => {}
                        Err(e) => {
                            warn!(session = %session_id, error = %e, "Invalid inbound frame");
                            metrics::record_error("protocol");
                            reply(&state, &session_id, ServerEvent::error(codes::INVALID_EVENT, e.to_string()));
                        }
                    },
                    Some(Err(e)) => {
                        warn!(session = %session_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(session = %session_id, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup: unregister first so no new push targets this session, then
    // drop the queue, which ends the writer.
    session.close();
    state.hub.detach(&session_id);
    if !writer_done {
        if let Err(e) = writer.await {
            error!(session = %session_id, error = %e, "Writer task panicked");
        }
    }
    metrics::set_users_online(state.fanout.online_count());

    debug!(session = %session_id, "WebSocket disconnected");
}

/// Dispatch one decoded client event.
async fn handle_event(event: ClientEvent, session: &Session, state: &AppState) {
    match event {
        ClientEvent::SendMessage(request) => {
            debug!(session = %session.id(), sender = %request.sender, recipient = %request.recipient, "sendMessage");
            let start = Instant::now();
            let result = state.fanout.handle_send_message(request).await;
            finish_send("direct", result, start, session, state);
        }

        ClientEvent::SendChannelMessage(request) => {
            debug!(session = %session.id(), sender = %request.sender, channel = %request.channel_id, "sendChannelMessage");
            let start = Instant::now();
            let result = state.fanout.handle_send_channel_message(request).await;
            finish_send("channel", result, start, session, state);
        }

        ClientEvent::Ping { timestamp } => {
            reply(state, session.id(), ServerEvent::Pong { timestamp });
        }
    }
}

/// Record the outcome of a send and report rejections to the sender only.
fn finish_send(
    kind: &'static str,
    result: Result<FanoutReport, FanoutError>,
    start: Instant,
    session: &Session,
    state: &AppState,
) {
    match result {
        Ok(report) => metrics::record_fanout(kind, &report, start.elapsed().as_secs_f64()),
        Err(e) => {
            let (code, error_type) = match &e {
                FanoutError::MalformedMessage(_) => (codes::MALFORMED_MESSAGE, "malformed"),
                FanoutError::Persistence(_) => (codes::PERSISTENCE_FAILURE, "persistence"),
            };
            warn!(session = %session.id(), error = %e, "Send rejected");
            metrics::record_error(error_type);
            reply(state, session.id(), ServerEvent::error(code, e.to_string()));
        }
    }
}

/// Queue a response for one session.
fn reply(state: &AppState, session_id: &SessionId, event: ServerEvent) {
    if let Err(e) = state.hub.send(session_id, Arc::new(event)) {
        debug!(session = %session_id, error = %e, "Reply dropped");
    }
}
