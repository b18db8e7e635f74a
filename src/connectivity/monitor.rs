use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex, Weak,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use log::{error, info, warn};
use tokio::{
    sync::{broadcast::error::RecvError, broadcast::Receiver, Mutex as AsyncMutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use super::source::{NetworkEvent, NetworkSource};

pub type Listener = Arc<dyn Fn(&NetworkEvent) + Send + Sync>;

/// Side effects run on connectivity edges, before listeners are notified.
#[async_trait]
pub trait ConnectivityHook: Send + Sync {
    async fn on_connected(&self);

    async fn on_disconnected(&self) {}
}

struct MonitorTask {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

struct MonitorInner {
    source: Arc<dyn NetworkSource>,
    is_connected: AtomicBool,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
    hook: Mutex<Option<Arc<dyn ConnectivityHook>>>,
    task: AsyncMutex<Option<MonitorTask>>,
}

/// Tracks online/offline state and fans out network events.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectivityMonitor {
    pub fn new(source: Arc<dyn NetworkSource>) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                source,
                // Optimistic until the initial fetch says otherwise.
                is_connected: AtomicBool::new(true),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
                hook: Mutex::new(None),
                task: AsyncMutex::new(None),
            }),
        }
    }

    pub fn set_hook(&self, hook: Arc<dyn ConnectivityHook>) {
        *lock(&self.inner.hook) = Some(hook);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.is_connected.load(Ordering::SeqCst)
    }

    pub async fn is_running(&self) -> bool {
        self.inner.task.lock().await.is_some()
    }

    /// Reads the current state and starts following the platform stream.
    /// The initial read never fires edge hooks.
    pub async fn initialize(&self) -> Result<bool> {
        let mut task_guard = self.inner.task.lock().await;
        if task_guard.is_some() {
            bail!("connectivity monitor already initialized");
        }

        // Subscribe before the one-shot read so no event slips between them.
        let events = self.inner.source.subscribe();
        let initial = self.inner.source.fetch().await;
        self.inner
            .is_connected
            .store(initial.is_connected, Ordering::SeqCst);
        info!(
            "Connectivity monitor started ({})",
            if initial.is_connected { "online" } else { "offline" }
        );

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(event_loop(
            self.inner.clone(),
            events,
            cancel_token.clone(),
        ));

        *task_guard = Some(MonitorTask {
            handle,
            cancel_token,
        });

        Ok(initial.is_connected)
    }

    /// Stops following the stream and drops every listener. Safe to call repeatedly.
    pub async fn destroy(&self) {
        let task = self.inner.task.lock().await.take();
        if let Some(task) = task {
            task.cancel_token.cancel();
            if let Err(err) = task.handle.await {
                error!("Connectivity monitor task failed to join: {err}");
            }
            info!("Connectivity monitor stopped");
        }
        lock(&self.inner.listeners).clear();
    }

    /// Registers a listener for every raw event; call the returned closure to unsubscribe.
    pub fn add_listener<F>(&self, listener: F) -> impl FnOnce() + Send + 'static
    where
        F: Fn(&NetworkEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.listeners).push((id, Arc::new(listener)));

        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);
        move || {
            if let Some(inner) = weak.upgrade() {
                lock(&inner.listeners).retain(|(listener_id, _)| *listener_id != id);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }
}

impl MonitorInner {
    async fn handle_event(&self, event: NetworkEvent) {
        let was_connected = self
            .is_connected
            .swap(event.is_connected, Ordering::SeqCst);
        let hook = lock(&self.hook).clone();

        match (was_connected, event.is_connected) {
            (false, true) => {
                info!("Connectivity restored");
                if let Some(hook) = hook {
                    hook.on_connected().await;
                }
            }
            (true, false) => {
                info!("Connectivity lost");
                if let Some(hook) = hook {
                    hook.on_disconnected().await;
                }
            }
            _ => {}
        }

        let listeners: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }
}

async fn event_loop(
    inner: Arc<MonitorInner>,
    mut events: Receiver<NetworkEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel_token.cancelled() => break,
            received = events.recv() => received,
        };

        let next = match received {
            Ok(event) => Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Connectivity monitor lagged by {skipped} events; re-reading state");
                None
            }
            Err(RecvError::Closed) => {
                info!("Network event stream closed");
                break;
            }
        };

        // Hooks can run a whole sync pass; cancellation must still get through.
        let handle = async {
            let event = match next {
                Some(event) => event,
                None => inner.source.fetch().await,
            };
            inner.handle_event(event).await;
        };
        tokio::select! {
            _ = cancel_token.cancelled() => {
                warn!("Connectivity monitor stopped while handling an event");
                break;
            }
            _ = handle => {}
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
