use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    BookingReceived,
    BookingAccepted,
    BookingDeclined,
    BookingWithdrawn,
}

/// What happened to a booking, addressed to a single principal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub recipient: Ulid,
    pub kind: NoticeKind,
    pub booking_id: Ulid,
    pub venue_id: Ulid,
    pub reason: Option<String>,
}

/// Fire-and-forget notification hub: one broadcast channel per recipient.
///
/// Delivery failure never propagates into a booking operation; a notice that
/// finds no listener is logged and dropped.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Notice>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self { channels: DashMap::new() }
    }

    /// Subscribe to notices for a principal. Creates the channel if needed.
    pub fn subscribe(&self, recipient: Ulid) -> broadcast::Receiver<Notice> {
        let sender = self
            .channels
            .entry(recipient)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Deliver a notice, best effort.
    pub fn send(&self, notice: Notice) {
        let Some(sender) = self.channels.get(&notice.recipient) else {
            tracing::debug!(recipient = %notice.recipient, "notice dropped: no channel");
            return;
        };
        if let Err(e) = sender.send(notice) {
            tracing::debug!("notice dropped: {e}");
        }
    }

    /// Remove a principal's channel.
    pub fn remove(&self, recipient: &Ulid) {
        self.channels.remove(recipient);
    }
}
