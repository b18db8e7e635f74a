mod monitor;
mod source;

pub use monitor::{ConnectivityHook, ConnectivityMonitor, Listener};
pub use source::{ChannelNetworkSource, NetworkEvent, NetworkSource};
