//! Process-internal event stream connecting the collector and report
//! pipeline to the notification engine and realtime hub.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{Activity, Report, Subscription};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SentinelEvent {
    NewActivity {
        activity: Activity,
        subscription: Subscription,
    },
    ReportReady {
        report: Report,
        subscription: Option<Subscription>,
    },
}

/// Broadcast fan-in for pipeline events. Cheap to clone; emitting with no
/// subscribers is fine.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SentinelEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }

    pub fn emit(&self, event: SentinelEvent) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SentinelEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
