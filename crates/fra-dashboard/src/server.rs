//! HTTP + WebSocket server exposing the Event channel (spec §6).
//!
//! No HTML is served; this is a JSON/WS surface only (spec §13 non-goal:
//! "no client-side rendering beyond serving the Event channel's raw
//! JSON/WS").

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use fra_core::repository::Repository;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::DashboardConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::state::DashboardState;
use crate::types::DashboardMessage;

/// Caps concurrent WebSocket connections so a burst of clients can't
/// exhaust the process's file descriptors.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self { current: AtomicUsize::new(0), max }
    }

    pub fn try_acquire(&self) -> Option<ConnectionGuard<'_>> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionGuard { limiter: self });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

pub struct ConnectionGuard<'a> {
    limiter: &'a ConnectionLimiter,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct AppState<R: Repository> {
    dashboard_state: DashboardState<R>,
    broadcast_tx: broadcast::Sender<String>,
    connection_limiter: Arc<ConnectionLimiter>,
}

impl<R: Repository + 'static> AppState<R> {
    pub fn new(dashboard_state: DashboardState<R>, broadcast_tx: broadcast::Sender<String>, config: &DashboardConfig) -> Self {
        Self {
            dashboard_state,
            broadcast_tx,
            connection_limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
        }
    }
}

pub fn create_router<R: Repository + 'static>(state: AppState<R>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/snapshot", get(get_snapshot::<R>))
        .route("/ws", get(ws_handler::<R>))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_snapshot<R: Repository + 'static>(State(state): State<AppState<R>>) -> Result<Json<crate::types::DashboardSnapshot>, Response> {
    state
        .dashboard_state
        .collect_snapshot()
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response())
}

async fn ws_handler<R: Repository + 'static>(State(state): State<AppState<R>>, ws: WebSocketUpgrade) -> Response {
    if state.connection_limiter.current_count() >= state.connection_limiter.max {
        warn!(
            current = state.connection_limiter.current_count(),
            "WebSocket connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    }
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection<R: Repository + 'static>(socket: WebSocket, state: AppState<R>) {
    let _guard = match state.connection_limiter.try_acquire() {
        Some(guard) => guard,
        None => {
            warn!("connection limit reached during upgrade");
            return;
        }
    };

    info!(connections = state.connection_limiter.current_count(), "new WebSocket connection");

    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.broadcast_tx.subscribe();

    match state.dashboard_state.collect_snapshot().await {
        Ok(snapshot) => {
            let initial = DashboardMessage::Snapshot(snapshot);
            if let Ok(json) = serde_json::to_string(&initial) {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    debug!("failed to send initial snapshot, client disconnected");
                    return;
                }
            }
        }
        Err(e) => warn!(error = %e, "failed to collect initial snapshot for new client"),
    }

    let mut incoming_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    debug!("client sent close frame");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "WebSocket receive error");
                    break;
                }
                _ => {}
            }
        }
    });

    loop {
        tokio::select! {
            result = broadcast_rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            debug!("failed to send message, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "WebSocket client lagged, catching up");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("broadcast channel closed");
                        break;
                    }
                }
            }
            _ = &mut incoming_task => {
                debug!("incoming task completed, closing connection");
                break;
            }
        }
    }

    info!(
        connections = state.connection_limiter.current_count().saturating_sub(1),
        "WebSocket connection closed"
    );
}

/// Bind and serve the dashboard HTTP/WebSocket surface. Spawns the
/// snapshot broadcaster as a background task; the caller is expected to
/// have already spawned `broadcast::run_event_relay` against the same
/// `broadcast_tx` for push-based event delivery.
pub async fn run_server<R: Repository + 'static>(
    dashboard_state: DashboardState<R>,
    broadcast_tx: broadcast::Sender<String>,
    config: DashboardConfig,
) -> DashboardResult<()> {
    let state = AppState::new(dashboard_state.clone(), broadcast_tx.clone(), &config);
    let app = create_router(state);

    tokio::spawn(crate::broadcast::run_snapshot_broadcaster(dashboard_state, broadcast_tx, config.update_interval_ms));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(port = config.port, "starting dashboard server");

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(DashboardError::Bind)?;
    axum::serve(listener, app).await.map_err(DashboardError::Serve)?;

    Ok(())
}
