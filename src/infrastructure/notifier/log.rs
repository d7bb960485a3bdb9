//! The one concrete `Notifier` kept in this repository: emits a structured
//! `tracing` event per notification rather than calling out to Slack/Discord
//! webhooks the way the teacher's own alerting adapters do.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::ports::{NotificationKind, Notifier};

pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, kind: NotificationKind, payload: serde_json::Value) {
        match kind {
            NotificationKind::Lockdown | NotificationKind::CoherenceFault | NotificationKind::HeartbeatLost => {
                warn!(?kind, %payload, "notification");
            }
            _ => {
                info!(?kind, %payload, "notification");
            }
        }
    }
}
