use tokio::sync::broadcast;

use crate::model::ContactPayload;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for cancellation notices. Relays subscribe and deliver the
/// payload to the chosen staff contact; the engine only publishes.
pub struct NotifyHub {
    sender: broadcast::Sender<ContactPayload>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContactPayload> {
        self.sender.subscribe()
    }

    /// Send a notice. No-op if nobody is listening.
    pub fn send(&self, payload: &ContactPayload) {
        let _ = self.sender.send(payload.clone());
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
