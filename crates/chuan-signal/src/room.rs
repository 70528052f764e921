//! Two-slot rooms
//!
//! A room owns at most one sender and one receiver socket. All slot
//! state lives under a single mutex, held only for bookkeeping; frames
//! are enqueued to a captured peer after the lock is released, so a
//! slow peer can never stall the room.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use chuan_core::SignalError;

use crate::frames::{self, Role, WireFrame, REASON_PEER_LEFT};
use crate::socket::PeerSocket;

/// An ephemeral rendezvous between one sender and one receiver
pub struct Room {
    code: String,
    created_at: Instant,
    state: Mutex<RoomState>,
}

struct RoomState {
    sender: Option<Arc<PeerSocket>>,
    receiver: Option<Arc<PeerSocket>>,
    /// Latched while both slots are occupied
    transferring: bool,
    /// Terminal; a closed room rejects attachment and is swept
    closed: bool,
    last_activity: Instant,
}

/// Snapshot of a room's occupancy for the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomStatus {
    pub sender_online: bool,
    pub receiver_online: bool,
    pub transferring: bool,
}

impl Room {
    pub fn new(code: String) -> Self {
        let now = Instant::now();
        Self {
            code,
            created_at: now,
            state: Mutex::new(RoomState {
                sender: None,
                receiver: None,
                transferring: false,
                closed: false,
                last_activity: now,
            }),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Attach a socket to its role slot.
    ///
    /// When the attach fills the second slot, both peers are sent a
    /// `peer-joined` frame naming the other's role.
    pub fn attach(&self, socket: &Arc<PeerSocket>) -> Result<(), SignalError> {
        let opposite = {
            let mut st = self.state.lock();
            if st.closed {
                return Err(SignalError::RoomClosed);
            }

            let slot = match socket.role() {
                Role::Sender => &mut st.sender,
                Role::Receiver => &mut st.receiver,
            };
            if slot.is_some() {
                return Err(SignalError::SlotTaken);
            }
            *slot = Some(socket.clone());
            st.last_activity = Instant::now();

            let opposite = match socket.role() {
                Role::Sender => st.receiver.clone(),
                Role::Receiver => st.sender.clone(),
            };
            if opposite.is_some() {
                st.transferring = true;
            }
            opposite
        };

        if let Some(peer) = opposite {
            peer.enqueue(WireFrame::Text(frames::peer_joined(socket.role())));
            socket.enqueue(WireFrame::Text(frames::peer_joined(peer.role())));
        }
        Ok(())
    }

    /// Forward a frame from one slot to the other, verbatim.
    ///
    /// Returns false when no peer is attached; the frame is dropped.
    pub fn forward(&self, from: Role, frame: WireFrame) -> bool {
        let peer = {
            let mut st = self.state.lock();
            st.last_activity = Instant::now();
            match from {
                Role::Sender => st.receiver.clone(),
                Role::Receiver => st.sender.clone(),
            }
        };

        match peer {
            Some(peer) => peer.enqueue(frame),
            None => {
                debug!(room = %self.code, %from, "no peer attached, frame dropped");
                false
            }
        }
    }

    /// Detach a socket: clear its slot, close its queue and tell the
    /// surviving peer. Safe to call more than once and from either the
    /// socket tasks or the sweeper; only the first caller does the
    /// work.
    pub fn detach(&self, socket: &Arc<PeerSocket>) {
        if !socket.begin_detach() {
            return;
        }

        let survivor = {
            let mut st = self.state.lock();
            let slot = match socket.role() {
                Role::Sender => &mut st.sender,
                Role::Receiver => &mut st.receiver,
            };
            if slot.as_ref().map(|s| s.id()) == Some(socket.id()) {
                *slot = None;
            }
            // A detach leaves at most one slot occupied.
            st.transferring = false;
            st.last_activity = Instant::now();
            match socket.role() {
                Role::Sender => st.receiver.clone(),
                Role::Receiver => st.sender.clone(),
            }
        };

        socket.close_queue();

        if let Some(peer) = survivor {
            peer.enqueue(WireFrame::Text(frames::disconnection(REASON_PEER_LEFT)));
        }
    }

    /// Close the room and every attached socket. Terminal.
    pub fn close(&self) {
        let (sender, receiver) = {
            let mut st = self.state.lock();
            st.closed = true;
            st.transferring = false;
            (st.sender.take(), st.receiver.take())
        };

        for socket in [sender, receiver].into_iter().flatten() {
            socket.begin_detach();
            socket.close_queue();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn status(&self) -> RoomStatus {
        let st = self.state.lock();
        RoomStatus {
            sender_online: st.sender.is_some(),
            receiver_online: st.receiver.is_some(),
            transferring: st.transferring,
        }
    }

    pub fn peer_count(&self) -> usize {
        let st = self.state.lock();
        st.sender.is_some() as usize + st.receiver.is_some() as usize
    }

    /// Whether the room outlived the hard age limit
    pub fn is_expired(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }

    /// Whether the room is empty and has seen no activity for `timeout`
    pub fn is_idle(&self, timeout: Duration) -> bool {
        let st = self.state.lock();
        st.sender.is_none() && st.receiver.is_none() && st.last_activity.elapsed() > timeout
    }

    /// Record activity that keeps the room alive
    pub fn touch(&self) {
        self.state.lock().last_activity = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::Envelope;

    fn room() -> Room {
        Room::new("A2B3C4".to_string())
    }

    async fn next_text(socket: &Arc<PeerSocket>) -> String {
        match socket.next_outbound().await {
            Some(WireFrame::Text(text)) => text,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_attach_both_roles() {
        let room = room();
        let sender = PeerSocket::new(Role::Sender);
        let receiver = PeerSocket::new(Role::Receiver);

        room.attach(&sender).unwrap();
        assert_eq!(
            room.status(),
            RoomStatus {
                sender_online: true,
                receiver_online: false,
                transferring: false
            }
        );

        room.attach(&receiver).unwrap();
        assert_eq!(
            room.status(),
            RoomStatus {
                sender_online: true,
                receiver_online: true,
                transferring: true
            }
        );
    }

    #[test]
    fn test_attach_slot_taken() {
        let room = room();
        room.attach(&PeerSocket::new(Role::Sender)).unwrap();

        let second = PeerSocket::new(Role::Sender);
        assert_eq!(room.attach(&second), Err(SignalError::SlotTaken));
        // The original occupant is untouched.
        assert!(room.status().sender_online);
    }

    #[test]
    fn test_attach_closed_room() {
        let room = room();
        room.close();
        assert_eq!(
            room.attach(&PeerSocket::new(Role::Sender)),
            Err(SignalError::RoomClosed)
        );
    }

    #[tokio::test]
    async fn test_peer_joined_sent_to_both() {
        let room = room();
        let sender = PeerSocket::new(Role::Sender);
        let receiver = PeerSocket::new(Role::Receiver);

        room.attach(&sender).unwrap();
        room.attach(&receiver).unwrap();

        let to_sender = Envelope::from_json(&next_text(&sender).await).unwrap();
        assert_eq!(to_sender.tag, "peer-joined");
        assert_eq!(to_sender.payload["role"], "receiver");

        let to_receiver = Envelope::from_json(&next_text(&receiver).await).unwrap();
        assert_eq!(to_receiver.tag, "peer-joined");
        assert_eq!(to_receiver.payload["role"], "sender");
    }

    #[tokio::test]
    async fn test_forward_verbatim() {
        let room = room();
        let sender = PeerSocket::new(Role::Sender);
        let receiver = PeerSocket::new(Role::Receiver);
        room.attach(&sender).unwrap();
        room.attach(&receiver).unwrap();

        // Skip the join announcement.
        next_text(&receiver).await;

        let raw = r#"{"type":"offer","payload":{"sdp":"v=0..."},"channel":"a"}"#;
        assert!(room.forward(Role::Sender, WireFrame::Text(raw.to_string())));
        assert_eq!(next_text(&receiver).await, raw);

        let bytes: Vec<u8> = (0u8..=255).collect();
        assert!(room.forward(Role::Sender, WireFrame::Binary(bytes.clone())));
        assert_eq!(
            receiver.next_outbound().await,
            Some(WireFrame::Binary(bytes))
        );
    }

    #[test]
    fn test_forward_without_peer_drops() {
        let room = room();
        let sender = PeerSocket::new(Role::Sender);
        room.attach(&sender).unwrap();
        assert!(!room.forward(Role::Sender, WireFrame::Text("{}".into())));
    }

    #[tokio::test]
    async fn test_detach_notifies_survivor_once() {
        let room = room();
        let sender = PeerSocket::new(Role::Sender);
        let receiver = PeerSocket::new(Role::Receiver);
        room.attach(&sender).unwrap();
        room.attach(&receiver).unwrap();
        next_text(&receiver).await; // peer-joined

        room.detach(&sender);
        room.detach(&sender); // re-entry must be a no-op

        let env = Envelope::from_json(&next_text(&receiver).await).unwrap();
        assert!(env.is_disconnection());
        assert_eq!(env.payload["reason"], "peer-left");

        // Exactly one disconnection: nothing else queued.
        assert!(!room.status().sender_online);
        assert!(room.status().receiver_online);
        assert!(!room.status().transferring);
        receiver.enqueue(WireFrame::Text("marker".into()));
        assert_eq!(next_text(&receiver).await, "marker");
    }

    #[tokio::test]
    async fn test_reattach_after_detach() {
        let room = room();
        let sender = PeerSocket::new(Role::Sender);
        let receiver = PeerSocket::new(Role::Receiver);
        room.attach(&sender).unwrap();
        room.attach(&receiver).unwrap();
        room.detach(&sender);

        // The room stays open; a fresh sender triggers a new join pair.
        let returned = PeerSocket::new(Role::Sender);
        room.attach(&returned).unwrap();
        assert!(room.status().transferring);

        let joined = Envelope::from_json(&next_text(&returned).await).unwrap();
        assert_eq!(joined.payload["role"], "receiver");
    }

    #[tokio::test]
    async fn test_close_closes_sockets() {
        let room = room();
        let sender = PeerSocket::new(Role::Sender);
        room.attach(&sender).unwrap();

        room.close();
        assert!(room.is_closed());
        assert!(sender.is_detached());
        assert_eq!(sender.next_outbound().await, None);
    }

    #[test]
    fn test_idle_and_expiry_thresholds() {
        let room = room();
        std::thread::sleep(Duration::from_millis(1));
        assert!(room.is_idle(Duration::ZERO));
        assert!(!room.is_idle(Duration::from_secs(600)));
        assert!(room.is_expired(Duration::ZERO));
        assert!(!room.is_expired(Duration::from_secs(600)));

        // An occupied room is never idle.
        room.attach(&PeerSocket::new(Role::Sender)).unwrap();
        assert!(!room.is_idle(Duration::ZERO));
    }
}
