//! chuan rendezvous server
//!
//! Assembles the HTTP control surface, the WebSocket signaling relay,
//! the embedded TURN service and the frontend handler. The router is
//! built here so integration tests can drive a real listener.

pub mod api;
pub mod frontend;
pub mod turn;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{Method, Uri};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use chuan_core::Config;
use chuan_signal::shutdown::{self, ShutdownReceiver, ShutdownSender};
use chuan_signal::RoomRegistry;

use crate::frontend::FrontendHandler;
use crate::turn::TurnService;

/// Bound on the graceful drain after a shutdown signal
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Shared state behind every handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub turn: Option<Arc<TurnService>>,
    pub frontend: Arc<FrontendHandler>,
    pub shutdown_rx: ShutdownReceiver,
}

/// Build the full router: API routes, WebSocket entry, SPA fallback.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(Duration::from_secs(300));

    Router::new()
        .route("/api/ws/webrtc", get(ws::upgrade))
        .route(
            "/api/create-room",
            post(api::create_room).fallback(api::method_not_allowed),
        )
        .route(
            "/api/room-info",
            get(api::room_info).fallback(api::method_not_allowed),
        )
        .route(
            "/api/turn/stats",
            get(api::turn_stats).fallback(api::method_not_allowed),
        )
        .route(
            "/api/turn/config",
            get(api::turn_config).fallback(api::method_not_allowed),
        )
        .route(
            "/api/admin/status",
            get(api::admin_status).fallback(api::method_not_allowed),
        )
        .fallback(frontend_route)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

async fn frontend_route(State(state): State<AppState>, uri: Uri) -> Response {
    state.frontend.serve(uri.path()).await
}

/// Run the server until a shutdown signal, then drain within
/// [`SHUTDOWN_GRACE`].
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    spawn_signal_listener(shutdown_tx.clone());

    let registry = Arc::new(RoomRegistry::new());
    let sweeper = registry.spawn_sweeper(shutdown_rx.clone());

    let turn_service = if config.turn.enabled {
        let service = Arc::new(TurnService::new(config.turn.clone()));
        service.start().await?;
        Some(service)
    } else {
        None
    };

    let state = AppState {
        registry: registry.clone(),
        turn: turn_service.clone(),
        frontend: Arc::new(FrontendHandler::from_config(config.frontend_dir.as_deref())),
        shutdown_rx: shutdown_rx.clone(),
    };
    let router = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("server listening on {addr}");

    let serve_shutdown = shutdown_rx.clone();
    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown::wait(serve_shutdown))
            .await
    });

    tokio::select! {
        result = &mut server_task => {
            // The server stopped without a shutdown signal: surface it.
            result??;
            return Ok(());
        }
        _ = shutdown::wait(shutdown_rx.clone()) => {
            info!("shutting down");
        }
    }

    let drain = async {
        match (&mut server_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "server ended with error"),
            Err(e) => warn!(error = %e, "server task ended abnormally"),
        }
        if let Some(turn) = &turn_service {
            if let Err(e) = turn.stop().await {
                warn!(error = %e, "failed to stop TURN server");
            }
        }
        registry.close_all();
        let _ = sweeper.await;
    };

    match tokio::time::timeout(SHUTDOWN_GRACE, drain).await {
        Ok(()) => {
            info!("server exited cleanly");
            Ok(())
        }
        Err(_) => {
            error!("graceful shutdown timed out");
            Err("graceful shutdown timed out".into())
        }
    }
}

fn spawn_signal_listener(shutdown_tx: ShutdownSender) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        shutdown::trigger(&shutdown_tx);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
