#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use chuan_server::frontend::FrontendHandler;
use chuan_server::turn::TurnService;
use chuan_server::{build_router, AppState};
use chuan_signal::shutdown::{self, ShutdownSender};
use chuan_signal::RoomRegistry;

/// A server bound to an ephemeral port, torn down on drop
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<RoomRegistry>,
    shutdown_tx: ShutdownSender,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with_turn(None).await
    }

    pub async fn spawn_with_turn(turn: Option<Arc<TurnService>>) -> Self {
        let (shutdown_tx, shutdown_rx) = shutdown::channel();
        let registry = Arc::new(RoomRegistry::new());

        let state = AppState {
            registry: registry.clone(),
            turn,
            frontend: Arc::new(FrontendHandler::Placeholder),
            shutdown_rx: shutdown_rx.clone(),
        };
        let router = build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");

        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown::wait(shutdown_rx))
                .await;
        });

        Self {
            addr,
            registry,
            shutdown_tx,
        }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, code: &str, role: &str) -> String {
        format!(
            "ws://{}/api/ws/webrtc?code={}&role={}",
            self.addr, code, role
        )
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        shutdown::trigger(&self.shutdown_tx);
    }
}

/// Allocate a room through the HTTP API and return its code
pub async fn create_room(server: &TestServer) -> String {
    let response: serde_json::Value = reqwest::Client::new()
        .post(server.http("/api/create-room"))
        .send()
        .await
        .expect("create-room request")
        .json()
        .await
        .expect("create-room body");

    assert_eq!(response["success"], true, "create-room failed: {response}");
    response["code"].as_str().expect("room code").to_string()
}
