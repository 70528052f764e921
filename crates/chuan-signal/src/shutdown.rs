//! Process-wide shutdown broadcast
//!
//! One watch channel fans out to the HTTP server, the sweeper, the
//! TURN service and every socket task.

use tokio::sync::watch;

pub type ShutdownSender = watch::Sender<bool>;
pub type ShutdownReceiver = watch::Receiver<bool>;

pub fn channel() -> (ShutdownSender, ShutdownReceiver) {
    watch::channel(false)
}

pub fn trigger(sender: &ShutdownSender) {
    let _ = sender.send(true);
}

/// Resolve once shutdown has been triggered (or the sender dropped)
pub async fn wait(mut receiver: ShutdownReceiver) {
    if *receiver.borrow() {
        return;
    }

    while receiver.changed().await.is_ok() {
        if *receiver.borrow() {
            break;
        }
    }
}
