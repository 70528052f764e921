//! Peer socket handles and the bounded send queue
//!
//! A `PeerSocket` is the room's view of one attached WebSocket: a
//! role, a send queue the write task drains, and a detach guard. The
//! queue never blocks the producer: overflow drops the oldest frame,
//! and a closed queue swallows writes, so enqueueing to a peer that is
//! concurrently detaching is safe.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use crate::frames::{Role, WireFrame};
use crate::SEND_QUEUE_CAPACITY;

static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// Handle over one attached WebSocket
pub struct PeerSocket {
    id: u64,
    role: Role,
    queue: SendQueue,
    detached: AtomicBool,
}

impl PeerSocket {
    pub fn new(role: Role) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed),
            role,
            queue: SendQueue::new(SEND_QUEUE_CAPACITY),
            detached: AtomicBool::new(false),
        })
    }

    /// Process-unique identifier, used to match slots on detach
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Queue a frame for delivery. Returns false if the socket is
    /// already closed; the frame is dropped in that case.
    pub fn enqueue(&self, frame: WireFrame) -> bool {
        match self.queue.push(frame) {
            Pushed::Queued => true,
            Pushed::DroppedOldest => {
                warn!(socket = self.id, role = %self.role, "send queue full, dropped oldest frame");
                true
            }
            Pushed::Closed => false,
        }
    }

    /// Next frame to write, or `None` once the queue is closed and
    /// drained.
    pub async fn next_outbound(&self) -> Option<WireFrame> {
        self.queue.pop().await
    }

    /// Close the queue; queued frames are still drained by the writer.
    pub fn close_queue(&self) {
        self.queue.close();
    }

    /// Flip the detach guard. Returns true for the caller that gets to
    /// run the detach work.
    pub fn begin_detach(&self) -> bool {
        !self.detached.swap(true, Ordering::SeqCst)
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }
}

enum Pushed {
    Queued,
    DroppedOldest,
    Closed,
}

/// Bounded FIFO with a closed flag under its own mutex
struct SendQueue {
    capacity: usize,
    inner: Mutex<QueueInner>,
    notify: Notify,
}

struct QueueInner {
    frames: VecDeque<WireFrame>,
    closed: bool,
}

impl SendQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(QueueInner {
                frames: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn push(&self, frame: WireFrame) -> Pushed {
        let result = {
            let mut q = self.inner.lock();
            if q.closed {
                return Pushed::Closed;
            }
            let dropped = if q.frames.len() >= self.capacity {
                q.frames.pop_front();
                true
            } else {
                false
            };
            q.frames.push_back(frame);
            if dropped {
                Pushed::DroppedOldest
            } else {
                Pushed::Queued
            }
        };
        self.notify.notify_one();
        result
    }

    async fn pop(&self) -> Option<WireFrame> {
        loop {
            let notified = self.notify.notified();
            {
                let mut q = self.inner.lock();
                if let Some(frame) = q.frames.pop_front() {
                    return Some(frame);
                }
                if q.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_one();
    }
}
