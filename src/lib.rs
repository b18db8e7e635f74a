pub mod api;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod models;
pub mod offline;
pub mod session;
pub mod storage;

#[cfg(test)]
mod test_utils;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use log::{info, warn};

pub use api::{HttpApiClient, RemoteApi};
pub use config::CoreConfig;
pub use connectivity::{ChannelNetworkSource, ConnectivityMonitor, NetworkEvent, NetworkSource};
pub use error::{ApiError, SessionError, StorageError};
pub use offline::{ApiReplay, OfflineQueue, SyncBackend};
pub use session::{EndOutcome, SessionEvent, SessionPhase, SessionSnapshot, WorkoutSessionController};
pub use storage::{KeyValueStore, LocalStore, MemoryStore, SqliteStore};

use models::{AuthResponse, User};

/// Sets up `env_logger` (reads `RUST_LOG`). Calling it again is a no-op.
pub fn init_logging() {
    let level = if config::debug_requested() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}

/// Every service the UI talks to, wired together.
pub struct FitnessCore {
    config: CoreConfig,
    store: LocalStore,
    api: Arc<dyn RemoteApi>,
    queue: Arc<OfflineQueue>,
    connectivity: ConnectivityMonitor,
    sessions: WorkoutSessionController,
}

impl FitnessCore {
    /// Opens the on-disk store under `data_dir` and talks to the configured backend over HTTP.
    pub async fn bootstrap(
        config: CoreConfig,
        data_dir: &Path,
        network: Arc<dyn NetworkSource>,
    ) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

        let db_path = data_dir.join(&config.database_file);
        let backend: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(db_path)?);
        let api: Arc<dyn RemoteApi> =
            Arc::new(HttpApiClient::new(&config).context("Failed to build API client")?);

        Self::assemble(config, backend, api, network).await
    }

    /// Wires the services over caller-provided storage and API implementations.
    pub async fn assemble(
        config: CoreConfig,
        backend: Arc<dyn KeyValueStore>,
        api: Arc<dyn RemoteApi>,
        network: Arc<dyn NetworkSource>,
    ) -> Result<Self> {
        let store = LocalStore::new(backend, &config.storage_namespace);
        let replay = Arc::new(ApiReplay::new(api.clone(), store.clone()));
        let queue = Arc::new(OfflineQueue::new(store.clone(), replay));

        let connectivity = ConnectivityMonitor::new(network);
        connectivity.set_hook(queue.clone());
        connectivity
            .initialize()
            .await
            .context("Failed to start connectivity monitor")?;

        let sessions = WorkoutSessionController::new(
            &config,
            store.clone(),
            api.clone(),
            queue.clone(),
            connectivity.clone(),
        );

        // Pick up a workout that was running when the app last went away.
        if let Some(session) = sessions.restore_session().await? {
            warn!(
                "Recovered unfinished session {} for workout {}",
                session.id, session.workout_id
            );
        }

        let pending = queue.get_offline_stats().await;
        info!(
            "Core ready ({}; {} offline records pending)",
            if connectivity.is_connected() { "online" } else { "offline" },
            pending.total()
        );

        Ok(Self {
            config,
            store,
            api,
            queue,
            connectivity,
            sessions,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn api(&self) -> &Arc<dyn RemoteApi> {
        &self.api
    }

    pub fn offline_queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn sessions(&self) -> &WorkoutSessionController {
        &self.sessions
    }

    /// Authenticates and keeps the token and user for later calls and sync passes.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let AuthResponse { token, user } = self.api.login(email, password).await?;
        self.store.set_token(&token).await?;
        self.store.set_user(&user).await?;
        info!("Signed in as {}", user.email);
        Ok(user)
    }

    /// Forgets the credentials. Queued records stay until the next login syncs them.
    pub async fn logout(&self) -> Result<()> {
        self.store.clear_auth().await?;
        info!("Signed out");
        Ok(())
    }

    /// Stops the tickers and the monitor, persisting the live session first.
    pub async fn shutdown(&self) {
        self.sessions.shutdown().await;
        self.connectivity.destroy().await;
        info!("Core shut down");
    }
}
