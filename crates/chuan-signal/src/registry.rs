//! Process-wide room registry
//!
//! One reader-writer lock guards the code→room map. The lock is held
//! only for map operations, never across socket I/O, and never while a
//! room's own lock is taken on the write path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use chuan_core::{code, SignalError};

use crate::room::Room;
use crate::shutdown::{self, ShutdownReceiver};
use crate::{CODE_CREATE_ATTEMPTS, ROOM_IDLE_TIMEOUT, ROOM_MAX_AGE, SWEEP_INTERVAL};

/// Registry of active rooms by code
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a fresh room and return its code.
    ///
    /// Codes are drawn at random and checked against the live map; the
    /// 32^6 space makes more than a few attempts vanishingly unlikely.
    pub fn create(&self) -> Result<String, SignalError> {
        for _ in 0..CODE_CREATE_ATTEMPTS {
            let candidate = code::generate_code();
            let mut rooms = self.rooms.write();
            if !rooms.contains_key(&candidate) {
                rooms.insert(candidate.clone(), Arc::new(Room::new(candidate.clone())));
                debug!(code = %candidate, "room created");
                return Ok(candidate);
            }
        }

        warn!("room code space exhausted after {CODE_CREATE_ATTEMPTS} attempts");
        Err(SignalError::CodeSpaceExhausted)
    }

    /// Case-insensitive lookup. Closed rooms are never returned.
    pub fn lookup(&self, code: &str) -> Option<Arc<Room>> {
        let normalized = code::normalize_code(code);
        let room = self.rooms.read().get(&normalized).cloned()?;
        if room.is_closed() {
            return None;
        }
        Some(room)
    }

    /// Drop a room from the map. Idempotent.
    pub fn remove(&self, code: &str) -> bool {
        let normalized = code::normalize_code(code);
        self.rooms.write().remove(&normalized).is_some()
    }

    /// Number of live rooms (for monitoring)
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Number of attached peers across all rooms (for monitoring)
    pub fn peer_count(&self) -> usize {
        self.rooms.read().values().map(|r| r.peer_count()).sum()
    }

    /// One sweeper pass with the production thresholds
    pub fn sweep(&self) {
        self.sweep_with(ROOM_MAX_AGE, ROOM_IDLE_TIMEOUT);
    }

    /// Close and remove rooms that are closed, too old, or empty and
    /// idle past `idle_timeout`.
    pub fn sweep_with(&self, max_age: Duration, idle_timeout: Duration) {
        let doomed: Vec<Arc<Room>> = {
            let rooms = self.rooms.read();
            rooms
                .values()
                .filter(|r| r.is_closed() || r.is_expired(max_age) || r.is_idle(idle_timeout))
                .cloned()
                .collect()
        };

        if doomed.is_empty() {
            return;
        }

        for room in &doomed {
            room.close();
        }

        let mut rooms = self.rooms.write();
        for room in &doomed {
            rooms.remove(room.code());
            info!(code = %room.code(), "room swept");
        }
    }

    /// Close every room; used on shutdown.
    pub fn close_all(&self) {
        let all: Vec<Arc<Room>> = self.rooms.read().values().cloned().collect();
        for room in &all {
            room.close();
        }
        self.rooms.write().clear();
    }

    /// Run the periodic sweeper until shutdown fires.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown_rx: ShutdownReceiver) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => registry.sweep(),
                    _ = shutdown::wait(shutdown_rx.clone()) => {
                        debug!("sweeper stopped");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::Role;
    use crate::socket::PeerSocket;

    #[test]
    fn test_create_and_lookup() {
        let registry = RoomRegistry::new();
        let code = registry.create().unwrap();
        assert!(code::validate_code(&code));

        let room = registry.lookup(&code).unwrap();
        assert_eq!(room.code(), code);
        assert_eq!(registry.room_count(), 1);
    }

    #[test]
    fn test_lookup_case_insensitive() {
        let registry = RoomRegistry::new();
        let code = registry.create().unwrap();
        assert!(registry.lookup(&code.to_ascii_lowercase()).is_some());
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = RoomRegistry::new();
        assert!(registry.lookup("ZZZZZZ").is_none());
    }

    #[test]
    fn test_closed_room_not_returned() {
        let registry = RoomRegistry::new();
        let code = registry.create().unwrap();
        registry.lookup(&code).unwrap().close();
        assert!(registry.lookup(&code).is_none());
    }

    #[test]
    fn test_remove_idempotent() {
        let registry = RoomRegistry::new();
        let code = registry.create().unwrap();
        assert!(registry.remove(&code));
        assert!(!registry.remove(&code));
        assert!(registry.lookup(&code).is_none());
    }

    #[test]
    fn test_codes_unique() {
        let registry = RoomRegistry::new();
        let a = registry.create().unwrap();
        let b = registry.create().unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.room_count(), 2);
    }

    #[test]
    fn test_sweep_removes_idle_rooms() {
        let registry = RoomRegistry::new();
        let code = registry.create().unwrap();

        // Fresh and empty: idle with a zero threshold, kept otherwise.
        registry.sweep_with(ROOM_MAX_AGE, Duration::from_secs(600));
        assert!(registry.lookup(&code).is_some());

        std::thread::sleep(Duration::from_millis(1));
        registry.sweep_with(ROOM_MAX_AGE, Duration::ZERO);
        assert!(registry.lookup(&code).is_none());
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn test_sweep_keeps_occupied_rooms() {
        let registry = RoomRegistry::new();
        let code = registry.create().unwrap();
        let room = registry.lookup(&code).unwrap();
        room.attach(&PeerSocket::new(Role::Sender)).unwrap();

        // Occupied rooms are not idle no matter the threshold.
        registry.sweep_with(ROOM_MAX_AGE, Duration::ZERO);
        assert!(registry.lookup(&code).is_some());
    }

    #[test]
    fn test_sweep_removes_aged_rooms() {
        let registry = RoomRegistry::new();
        let code = registry.create().unwrap();
        let room = registry.lookup(&code).unwrap();
        room.attach(&PeerSocket::new(Role::Sender)).unwrap();

        // Even an occupied room goes once past the hard age limit.
        std::thread::sleep(Duration::from_millis(1));
        registry.sweep_with(Duration::ZERO, Duration::from_secs(600));
        assert!(registry.lookup(&code).is_none());
    }

    #[test]
    fn test_peer_count() {
        let registry = RoomRegistry::new();
        let code = registry.create().unwrap();
        let room = registry.lookup(&code).unwrap();
        assert_eq!(registry.peer_count(), 0);

        room.attach(&PeerSocket::new(Role::Sender)).unwrap();
        room.attach(&PeerSocket::new(Role::Receiver)).unwrap();
        assert_eq!(registry.peer_count(), 2);
    }

    #[tokio::test]
    async fn test_sweeper_exits_on_shutdown() {
        let registry = Arc::new(RoomRegistry::new());
        let (shutdown_tx, shutdown_rx) = shutdown::channel();

        let sweeper = registry.spawn_sweeper(shutdown_rx);
        shutdown::trigger(&shutdown_tx);

        tokio::time::timeout(Duration::from_secs(1), sweeper)
            .await
            .expect("sweeper did not stop")
            .expect("sweeper panicked");
    }

    #[test]
    fn test_close_all() {
        let registry = RoomRegistry::new();
        let code = registry.create().unwrap();
        let room = registry.lookup(&code).unwrap();

        registry.close_all();
        assert!(room.is_closed());
        assert_eq!(registry.room_count(), 0);
    }
}
