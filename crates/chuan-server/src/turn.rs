//! Embedded TURN relay
//!
//! Wraps the webrtc-rs TURN server behind a small state machine so the
//! rest of the process only ever sees `stopped` or `running`. The
//! service owns its listeners, a single-user auth callback bound to the
//! configured credentials, and the counters surfaced by the control
//! API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use webrtc::turn::auth::{generate_auth_key, AuthHandler};
use webrtc::turn::relay::relay_static::RelayAddressGeneratorStatic;
use webrtc::turn::server::config::{ConnConfig, ServerConfig};
use webrtc::turn::server::Server;
use webrtc::turn::Error as TurnLibError;
use webrtc::util::vnet::net::Net;

use chuan_core::TurnConfig;

/// Errors from the TURN service lifecycle
#[derive(Error, Debug)]
pub enum TurnServiceError {
    #[error("TURN server already running")]
    AlreadyRunning,

    #[error("TURN server not running")]
    NotRunning,

    #[error("failed to bind TURN listener: {0}")]
    Bind(#[from] std::io::Error),

    #[error("TURN library error: {0}")]
    Library(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// The ICE server entry clients embed in their WebRTC configuration
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TurnDescriptor {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// Counter snapshot for the stats endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnStatsSnapshot {
    pub is_running: bool,
    pub active_allocations: i64,
    pub total_allocations: i64,
    pub bytes_transferred: i64,
    pub packets_transferred: i64,
    pub connections: i64,
    pub port: u16,
    pub username: String,
    pub realm: String,
}

#[derive(Debug, Default, Clone)]
struct Counters {
    active_allocations: i64,
    total_allocations: i64,
    bytes_transferred: i64,
    packets_transferred: i64,
    connections: i64,
}

#[derive(Default)]
struct TurnStats {
    counters: Mutex<Counters>,
}

impl TurnStats {
    fn record_connection(&self) {
        self.counters.lock().connections += 1;
    }

    fn record_allocation(&self) {
        let mut c = self.counters.lock();
        c.active_allocations += 1;
        c.total_allocations += 1;
    }

    fn release_allocation(&self, relayed_bytes: i64) {
        let mut c = self.counters.lock();
        if c.active_allocations > 0 {
            c.active_allocations -= 1;
        }
        c.bytes_transferred += relayed_bytes;
    }

    fn snapshot(&self) -> Counters {
        self.counters.lock().clone()
    }
}

struct Inner {
    state: TurnState,
    server: Option<Server>,
    /// The library relays over UDP only; the TCP socket is held so a
    /// port conflict on either protocol fails `start` atomically.
    tcp_reservation: Option<TcpListener>,
}

/// TURN relay co-located with the rendezvous server
pub struct TurnService {
    config: TurnConfig,
    stats: Arc<TurnStats>,
    inner: Mutex<Inner>,
}

impl TurnService {
    pub fn new(config: TurnConfig) -> Self {
        Self {
            config,
            stats: Arc::new(TurnStats::default()),
            inner: Mutex::new(Inner {
                state: TurnState::Stopped,
                server: None,
                tcp_reservation: None,
            }),
        }
    }

    /// Bind listeners and launch the relay. Nothing is left running if
    /// any step fails.
    pub async fn start(&self) -> Result<(), TurnServiceError> {
        {
            let mut inner = self.inner.lock();
            if inner.state != TurnState::Stopped {
                return Err(TurnServiceError::AlreadyRunning);
            }
            inner.state = TurnState::Starting;
        }

        match self.launch().await {
            Ok((server, tcp)) => {
                let mut inner = self.inner.lock();
                inner.server = Some(server);
                inner.tcp_reservation = Some(tcp);
                inner.state = TurnState::Running;
                info!(
                    port = self.config.port,
                    username = %self.config.username,
                    realm = %self.config.realm,
                    "TURN server started"
                );
                Ok(())
            }
            Err(e) => {
                self.inner.lock().state = TurnState::Stopped;
                Err(e)
            }
        }
    }

    async fn launch(&self) -> Result<(Server, TcpListener), TurnServiceError> {
        let bind = format!("0.0.0.0:{}", self.config.port);
        let udp = UdpSocket::bind(&bind).await?;
        let tcp = TcpListener::bind(&bind).await?;

        let (alloc_tx, mut alloc_rx) =
            mpsc::channel::<webrtc::turn::allocation::AllocationInfo>(16);
        {
            let stats = self.stats.clone();
            tokio::spawn(async move {
                while let Some(info) = alloc_rx.recv().await {
                    stats.release_allocation(info.relayed_bytes as i64);
                    debug!("TURN allocation released");
                }
            });
        }

        let auth = CredentialAuth {
            username: self.config.username.clone(),
            realm: self.config.realm.clone(),
            key: generate_auth_key(
                &self.config.username,
                &self.config.realm,
                &self.config.password,
            ),
            stats: self.stats.clone(),
        };

        let server = Server::new(ServerConfig {
            conn_configs: vec![ConnConfig {
                conn: Arc::new(udp),
                relay_addr_generator: Box::new(RelayAddressGeneratorStatic {
                    relay_address: self.config.relay_ip,
                    address: "0.0.0.0".to_owned(),
                    net: Arc::new(Net::new(None)),
                }),
            }],
            realm: self.config.realm.clone(),
            auth_handler: Arc::new(auth),
            channel_bind_timeout: Duration::from_secs(0),
            alloc_close_notify: Some(alloc_tx),
        })
        .await
        .map_err(|e| TurnServiceError::Library(e.to_string()))?;

        Ok((server, tcp))
    }

    /// Stop the relay and release the port.
    pub async fn stop(&self) -> Result<(), TurnServiceError> {
        let server = {
            let mut inner = self.inner.lock();
            if inner.state != TurnState::Running {
                return Err(TurnServiceError::NotRunning);
            }
            inner.state = TurnState::Stopping;
            inner.tcp_reservation = None;
            inner.server.take()
        };

        if let Some(server) = server {
            if let Err(e) = server.close().await {
                // Leave the service marked running; the caller decides
                // whether to retry.
                self.inner.lock().state = TurnState::Running;
                return Err(TurnServiceError::Library(e.to_string()));
            }
        }

        self.inner.lock().state = TurnState::Stopped;
        info!("TURN server stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().state == TurnState::Running
    }

    /// Client descriptor; only published while the relay is running.
    pub fn descriptor(&self) -> Option<TurnDescriptor> {
        if !self.is_running() {
            return None;
        }
        Some(TurnDescriptor {
            urls: vec![format!(
                "turn:{}:{}",
                self.config.public_host, self.config.port
            )],
            username: self.config.username.clone(),
            credential: self.config.password.clone(),
        })
    }

    pub fn stats(&self) -> TurnStatsSnapshot {
        let c = self.stats.snapshot();
        TurnStatsSnapshot {
            is_running: self.is_running(),
            active_allocations: c.active_allocations,
            total_allocations: c.total_allocations,
            bytes_transferred: c.bytes_transferred,
            packets_transferred: c.packets_transferred,
            connections: c.connections,
            port: self.config.port,
            username: self.config.username.clone(),
            realm: self.config.realm.clone(),
        }
    }
}

/// Long-term-credential check for the single configured user
struct CredentialAuth {
    username: String,
    realm: String,
    key: Vec<u8>,
    stats: Arc<TurnStats>,
}

impl AuthHandler for CredentialAuth {
    fn auth_handle(
        &self,
        username: &str,
        realm: &str,
        src_addr: SocketAddr,
    ) -> Result<Vec<u8>, TurnLibError> {
        self.stats.record_connection();
        debug!(%username, %realm, %src_addr, "TURN auth request");

        if username == self.username && realm == self.realm {
            self.stats.record_allocation();
            Ok(self.key.clone())
        } else {
            warn!(%username, %src_addr, "TURN auth rejected");
            Err(TurnLibError::Other("invalid credentials".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(port: u16) -> TurnConfig {
        TurnConfig {
            enabled: true,
            port,
            ..TurnConfig::default()
        }
    }

    fn src() -> SocketAddr {
        "203.0.113.7:49152".parse().unwrap()
    }

    #[tokio::test]
    async fn test_stop_before_start_fails() {
        let service = TurnService::new(test_config(0));
        assert!(matches!(
            service.stop().await,
            Err(TurnServiceError::NotRunning)
        ));
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_descriptor_gated_on_running() {
        let service = TurnService::new(test_config(0));
        assert!(service.descriptor().is_none());

        service.start().await.unwrap();
        let desc = service.descriptor().unwrap();
        assert_eq!(desc.username, "chuan");
        assert_eq!(desc.credential, "chuan123");
        assert!(desc.urls[0].starts_with("turn:localhost:"));

        service.stop().await.unwrap();
        assert!(service.descriptor().is_none());
    }

    #[tokio::test]
    async fn test_start_stop_round_trip() {
        let service = TurnService::new(test_config(0));

        service.start().await.unwrap();
        assert!(service.is_running());
        assert!(matches!(
            service.start().await,
            Err(TurnServiceError::AlreadyRunning)
        ));

        service.stop().await.unwrap();
        assert!(!service.is_running());
        assert!(matches!(
            service.stop().await,
            Err(TurnServiceError::NotRunning)
        ));

        // The port is free again; a second cycle works.
        service.start().await.unwrap();
        service.stop().await.unwrap();
    }

    #[test]
    fn test_auth_handler_counts() {
        let stats = Arc::new(TurnStats::default());
        let auth = CredentialAuth {
            username: "chuan".into(),
            realm: "localhost".into(),
            key: generate_auth_key("chuan", "localhost", "chuan123"),
            stats: stats.clone(),
        };

        assert!(auth.auth_handle("chuan", "localhost", src()).is_ok());
        assert!(auth.auth_handle("intruder", "localhost", src()).is_err());
        assert!(auth.auth_handle("chuan", "elsewhere", src()).is_err());

        let c = stats.snapshot();
        assert_eq!(c.connections, 3);
        assert_eq!(c.active_allocations, 1);
        assert_eq!(c.total_allocations, 1);
    }

    #[test]
    fn test_release_allocation_floors_at_zero() {
        let stats = TurnStats::default();
        stats.release_allocation(128);
        let c = stats.snapshot();
        assert_eq!(c.active_allocations, 0);
        assert_eq!(c.bytes_transferred, 128);
    }

    #[test]
    fn test_stats_snapshot_shape() {
        let service = TurnService::new(test_config(3478));
        let stats = service.stats();
        assert!(!stats.is_running);
        assert_eq!(stats.port, 3478);
        assert_eq!(stats.username, "chuan");
        assert_eq!(stats.realm, "localhost");

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["isRunning"], false);
        assert_eq!(json["activeAllocations"], 0);
    }
}
