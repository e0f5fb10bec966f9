use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crewcast_config::GatewaySettings;
use crewcast_events::{BroadcastEngine, Event};

use crate::adapter::WebSocketSubscriber;
use crate::error::GatewayError;
use crate::protocol::{ErrorResponse, HealthResponse, PublishResponse};
use crate::signal::wait_for_shutdown_signal;

/// WebSocket route streaming every published event.
pub const STREAM_PATH: &str = "/streaming/ws/crew-output";
/// HTTP route accepting events from producers.
pub const PUBLISH_PATH: &str = "/events";

struct AppState {
    engine: Arc<BroadcastEngine>,
    auth_token: Option<String>,
    start_time: Instant,
    next_connection: AtomicU64,
    closing: watch::Receiver<bool>,
}

pub struct GatewayServer {
    engine: Arc<BroadcastEngine>,
    auth_token: Option<String>,
    cors_origins: Vec<String>,
    closing: Arc<watch::Sender<bool>>,
}

impl GatewayServer {
    pub fn new(engine: Arc<BroadcastEngine>) -> Self {
        Self {
            engine,
            auth_token: None,
            cors_origins: Vec::new(),
            closing: Arc::new(watch::channel(false).0),
        }
    }

    pub fn from_settings(engine: Arc<BroadcastEngine>, settings: &GatewaySettings) -> Self {
        Self::new(engine)
            .with_auth_token(settings.auth_token.clone())
            .with_cors_origins(settings.cors_origins.clone())
    }

    /// Set an authentication token. When set, stream and publish requests must
    /// provide a matching `Authorization: Bearer <token>` header.
    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token;
        self
    }

    /// Restrict CORS to the given origins. Empty means any origin.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    pub fn engine(&self) -> &Arc<BroadcastEngine> {
        &self.engine
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            engine: self.engine.clone(),
            auth_token: self.auth_token.clone(),
            start_time: Instant::now(),
            next_connection: AtomicU64::new(1),
            closing: self.closing.subscribe(),
        });
        Router::new()
            .route(STREAM_PATH, axum::routing::any(stream_handler))
            .route(PUBLISH_PATH, axum::routing::post(publish_handler))
            .route("/health", axum::routing::get(health_handler))
            .layer(self.cors_layer())
            .with_state(state)
    }

    /// Binds `host:port` and serves until Ctrl-C or SIGTERM.
    pub async fn start(&self, host: &str, port: u16) -> Result<(), GatewayError> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| GatewayError::Bind {
                addr: addr.clone(),
                reason: e.to_string(),
            })?;

        tracing::info!("Gateway started on http://{} (stream: ws://{}{})", addr, addr, STREAM_PATH);

        self.serve(listener, async {
            if let Err(error) = wait_for_shutdown_signal().await {
                tracing::error!(%error, "Failed to listen for shutdown signals");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serves on `listener` until `shutdown` completes.
    ///
    /// On shutdown the engine drains queued deliveries first, then open
    /// streams are closed so the server can exit.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let engine = self.engine.clone();
        let closing = self.closing.clone();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutting down gateway");
                let report = engine.shutdown().await;
                tracing::info!(
                    completed = report.completed,
                    aborted = report.aborted,
                    "Event subscribers drained"
                );
                closing.send_replace(true);
            })
            .await
            .map_err(|e| GatewayError::Server(e.to_string()))
    }

    fn cors_layer(&self) -> CorsLayer {
        let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
        if self.cors_origins.is_empty() {
            return layer.allow_origin(Any);
        }

        let origins: Vec<HeaderValue> = self
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

fn is_authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected_token) = &state.auth_token else {
        return true;
    };
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected_token.as_str())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.engine.stats();
    Json(HealthResponse {
        status: if state.engine.is_shutting_down() {
            "shutting_down".to_string()
        } else {
            "ok".to_string()
        },
        uptime_secs: state.start_time.elapsed().as_secs(),
        subscribers: stats.subscribers,
        published: stats.published,
        evicted: stats.evicted,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn publish_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<Event>, JsonRejection>,
) -> Response {
    if !is_authorized(&state, &headers) {
        return error_response(StatusCode::UNAUTHORIZED, "Missing or invalid bearer token");
    }

    let event = match payload {
        Ok(Json(event)) => event,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid event: {}", rejection.body_text()),
            )
        }
    };

    let report = state.engine.publish(event);
    Json(PublishResponse {
        accepted: true,
        dispatched: report.dispatched,
    })
    .into_response()
}

async fn stream_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !is_authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection = state.next_connection.fetch_add(1, Ordering::Relaxed);
    let (sink, mut stream) = socket.split();
    let (subscriber, mut released) = WebSocketSubscriber::new(format!("ws-{}", connection), sink);
    let id = state.engine.subscribe(Arc::new(subscriber));
    let mut closing = state.closing.clone();

    // Inbound frames only keep the connection alive. The write half comes back
    // once the engine drops the subscriber, and is used to close the socket.
    let sink = loop {
        tokio::select! {
            msg = stream.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break None,
                Some(Ok(_)) => continue,
            },
            sink = &mut released => break sink.ok(),
            _ = wait_closing(&mut closing) => break released.try_recv().ok(),
        }
    };

    state.engine.unregister(id);

    if let Some(mut sink) = sink {
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
        tracing::debug!(connection, %id, "Stream closed by server");
    } else {
        tracing::debug!(connection, %id, "Stream client disconnected");
    }
}

async fn wait_closing(closing: &mut watch::Receiver<bool>) {
    if closing.wait_for(|closing| *closing).await.is_err() {
        std::future::pending::<()>().await;
    }
}
