//! Signaling domain for the chuan rendezvous server
//!
//! A room is a two-slot rendezvous keyed by a short code. Each slot
//! holds one peer socket; the relay forwards every frame from one slot
//! to the other verbatim. This crate owns rooms, the registry and the
//! per-socket send queues; the HTTP/WebSocket transport lives in the
//! server crate.

pub mod frames;
pub mod registry;
pub mod room;
pub mod shutdown;
pub mod socket;

pub use frames::{Envelope, Role, WireFrame};
pub use registry::RoomRegistry;
pub use room::{Room, RoomStatus};
pub use socket::PeerSocket;

use std::time::Duration;

/// Bounded send queue depth per peer socket
pub const SEND_QUEUE_CAPACITY: usize = 64;

/// Rooms older than this are closed by the sweeper
pub const ROOM_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Empty rooms idle longer than this are closed by the sweeper
pub const ROOM_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Interval between sweeper passes
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Per-frame read deadline on a peer socket
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-frame write deadline on a peer socket
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between server-originated pings
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Attempts at generating an unused room code before giving up
pub const CODE_CREATE_ATTEMPTS: usize = 64;
