use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 64;

/// Raw network-state event as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEvent {
    pub is_connected: bool,
    #[serde(default)]
    pub connection_type: Option<String>,
}

impl NetworkEvent {
    pub fn connected() -> Self {
        Self {
            is_connected: true,
            connection_type: None,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            is_connected: false,
            connection_type: None,
        }
    }
}

/// Platform network-state stream.
#[async_trait]
pub trait NetworkSource: Send + Sync {
    /// One-shot read of the current state.
    async fn fetch(&self) -> NetworkEvent;

    fn subscribe(&self) -> broadcast::Receiver<NetworkEvent>;
}

/// Source fed by the host shell, which forwards its platform callbacks via [`publish`].
///
/// [`publish`]: ChannelNetworkSource::publish
pub struct ChannelNetworkSource {
    sender: broadcast::Sender<NetworkEvent>,
    current: AtomicBool,
}

impl ChannelNetworkSource {
    pub fn new(initially_connected: bool) -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            sender,
            current: AtomicBool::new(initially_connected),
        }
    }

    pub fn publish(&self, event: NetworkEvent) {
        self.current.store(event.is_connected, Ordering::SeqCst);
        // No subscribers yet is fine; `fetch` still reflects the latest state.
        let _ = self.sender.send(event);
    }
}

#[async_trait]
impl NetworkSource for ChannelNetworkSource {
    async fn fetch(&self) -> NetworkEvent {
        NetworkEvent {
            is_connected: self.current.load(Ordering::SeqCst),
            connection_type: None,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.sender.subscribe()
    }
}
