use std::{sync::Arc, time::Duration};

use chrono::Utc;
use log::{error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

use crate::{
    api::RemoteApi,
    config::CoreConfig,
    connectivity::ConnectivityMonitor,
    error::SessionError,
    models::{CompletionData, OfflineRecord, Session, Workout},
    offline::OfflineQueue,
    storage::LocalStore,
};

use super::state::{SessionPhase, SessionState};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session: Option<Session>,
    pub elapsed_seconds: u64,
    pub is_resting: bool,
    pub rest_time: u64,
}

impl SessionSnapshot {
    fn capture(state: &mut SessionState) -> Self {
        state.sync_elapsed();
        Self {
            phase: state.phase,
            session: state.session.clone(),
            elapsed_seconds: state.elapsed_seconds(),
            is_resting: state.rest.is_running(),
            rest_time: state.rest.remaining_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionSnapshot),
    Tick { elapsed_seconds: u64 },
    RestTick { remaining_secs: u64 },
    RestFinished { skipped: bool },
    /// The backend confirmed the completed session.
    Completed(Session),
    /// The completed session went to the offline queue instead.
    Queued(OfflineRecord<Session>),
}

/// How a finished session left the device.
#[derive(Debug, Clone, PartialEq)]
pub enum EndOutcome {
    Synced(Session),
    Queued(OfflineRecord<Session>),
}

impl EndOutcome {
    pub fn session(&self) -> &Session {
        match self {
            EndOutcome::Synced(session) => session,
            EndOutcome::Queued(record) => &record.payload,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, EndOutcome::Queued(_))
    }
}

/// Owns the single active workout session.
///
/// Network failures never block the workout: a session that cannot be opened
/// remotely runs locally, and one that cannot be closed remotely goes to the
/// offline queue. The in-flight session is persisted after every change so a
/// crash can be recovered with [`restore_session`](Self::restore_session).
#[derive(Clone)]
pub struct WorkoutSessionController {
    state: Arc<Mutex<SessionState>>,
    store: LocalStore,
    api: Arc<dyn RemoteApi>,
    queue: Arc<OfflineQueue>,
    connectivity: ConnectivityMonitor,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    rest_ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    events: broadcast::Sender<SessionEvent>,
    tick_interval: Duration,
    persist_every_ticks: u32,
}

impl WorkoutSessionController {
    pub fn new(
        config: &CoreConfig,
        store: LocalStore,
        api: Arc<dyn RemoteApi>,
        queue: Arc<OfflineQueue>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            store,
            api,
            queue,
            connectivity,
            ticker: Arc::new(Mutex::new(None)),
            rest_ticker: Arc::new(Mutex::new(None)),
            events,
            tick_interval: config.tick_interval(),
            persist_every_ticks: config.persist_every_ticks(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn get_snapshot(&self) -> SessionSnapshot {
        let mut guard = self.state.lock().await;
        SessionSnapshot::capture(&mut guard)
    }

    pub async fn start_workout(&self, workout: &Workout) -> Result<Session, SessionError> {
        {
            let mut state = self.state.lock().await;
            if let Some(active_id) = state.active_session_id() {
                return Err(SessionError::AlreadyActive {
                    session_id: active_id.to_string(),
                });
            }
            if !state.reserve() {
                return Err(SessionError::StartInProgress);
            }
        }

        // The slot stays reserved, so the lock is free while the backend answers.
        let tapped = Instant::now();
        let session = self.open_session(&workout.id).await;

        let snapshot = {
            let mut state = self.state.lock().await;
            state.begin(session, tapped);
            SessionSnapshot::capture(&mut state)
        };

        let session = snapshot.session.clone().ok_or(SessionError::NoActiveSession)?;
        info!(
            "Started session {} for workout {}{}",
            session.id,
            session.workout_id,
            if session.is_offline { " (offline)" } else { "" }
        );

        self.persist(&session).await;
        self.spawn_ticker().await;
        self.emit(SessionEvent::StateChanged(snapshot));
        Ok(session)
    }

    /// Freezes the counter. Returns `None` when nothing is running.
    pub async fn pause_workout(&self) -> Result<Option<Session>, SessionError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            if !state.pause(Utc::now()) {
                return Ok(None);
            }
            SessionSnapshot::capture(&mut state)
        };

        self.cancel_ticker().await;
        let session = snapshot.session.clone();
        if let Some(session) = &session {
            info!("Paused session {} at {}s", session.id, session.elapsed_seconds);
            self.persist(session).await;
        }
        self.emit(SessionEvent::StateChanged(snapshot));
        Ok(session)
    }

    /// Restarts the counter from its paused value. Returns `None` unless paused.
    pub async fn resume_workout(&self) -> Result<Option<Session>, SessionError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            if !state.resume(Instant::now()) {
                return Ok(None);
            }
            SessionSnapshot::capture(&mut state)
        };

        let session = snapshot.session.clone();
        if let Some(session) = &session {
            info!("Resumed session {} at {}s", session.id, session.elapsed_seconds);
            self.persist(session).await;
        }
        self.spawn_ticker().await;
        self.emit(SessionEvent::StateChanged(snapshot));
        Ok(session)
    }

    /// Completes the active session. The local slot is cleared whether or not
    /// the backend could be reached.
    pub async fn end_workout(&self, completion: CompletionData) -> Result<EndOutcome, SessionError> {
        let (session, snapshot) = {
            let mut state = self.state.lock().await;
            let session = state
                .finish(Utc::now(), &completion)
                .ok_or(SessionError::NoActiveSession)?;
            (session, SessionSnapshot::capture(&mut state))
        };

        self.cancel_ticker().await;

        let outcome = match self.close_session(&session).await {
            Some(confirmed) => {
                info!("Session {} synced ({}s)", confirmed.id, session.elapsed_seconds);
                EndOutcome::Synced(confirmed)
            }
            None => match self.queue.save_offline_workout_session(session).await {
                Ok(record) => EndOutcome::Queued(record),
                Err(err) => {
                    error!("Failed to queue completed session: {err}");
                    self.clear_persisted().await;
                    self.emit(SessionEvent::StateChanged(snapshot));
                    return Err(err.into());
                }
            },
        };

        self.clear_persisted().await;
        self.emit(SessionEvent::StateChanged(snapshot));
        self.emit(match &outcome {
            EndOutcome::Synced(session) => SessionEvent::Completed(session.clone()),
            EndOutcome::Queued(record) => SessionEvent::Queued(record.clone()),
        });
        Ok(outcome)
    }

    /// Discards the active session without recording it anywhere.
    pub async fn cancel_workout(&self) -> Result<Option<Session>, SessionError> {
        let (session, snapshot) = {
            let mut state = self.state.lock().await;
            let Some(session) = state.cancel() else {
                return Ok(None);
            };
            (session, SessionSnapshot::capture(&mut state))
        };

        self.cancel_ticker().await;
        self.clear_persisted().await;
        info!("Cancelled session {}", session.id);
        self.emit(SessionEvent::StateChanged(snapshot));
        Ok(Some(session))
    }

    /// Reloads a session persisted before the app went away. It comes back paused.
    pub async fn restore_session(&self) -> Result<Option<Session>, SessionError> {
        let mut state = self.state.lock().await;
        if let Some(active_id) = state.active_session_id() {
            return Err(SessionError::AlreadyActive {
                session_id: active_id.to_string(),
            });
        }
        if state.phase == SessionPhase::Starting {
            return Err(SessionError::StartInProgress);
        }

        let Some(persisted) = self.store.get_active_session().await else {
            return Ok(None);
        };
        if persisted.is_ended() {
            warn!("Discarding persisted session {} that had already ended", persisted.id);
            drop(state);
            self.clear_persisted().await;
            return Ok(None);
        }

        state.restore(persisted, Utc::now());
        let snapshot = SessionSnapshot::capture(&mut state);
        drop(state);

        let session = snapshot.session.clone();
        if let Some(session) = &session {
            warn!(
                "Recovered session {} at {}s; resume to continue",
                session.id, session.elapsed_seconds
            );
            self.persist(session).await;
        }
        self.emit(SessionEvent::StateChanged(snapshot));
        Ok(session)
    }

    /// Starts (or restarts) the rest countdown. Zero seconds is a no-op.
    pub async fn start_rest(&self, duration_secs: u64) {
        if duration_secs == 0 {
            return;
        }
        {
            let mut state = self.state.lock().await;
            state.rest.start(duration_secs, Instant::now());
        }
        self.spawn_rest_ticker().await;
        self.emit(SessionEvent::RestTick {
            remaining_secs: duration_secs,
        });
    }

    pub async fn stop_rest(&self) {
        if self.end_rest().await {
            let snapshot = self.get_snapshot().await;
            self.emit(SessionEvent::StateChanged(snapshot));
        }
    }

    pub async fn skip_rest(&self) {
        if self.end_rest().await {
            self.emit(SessionEvent::RestFinished { skipped: true });
        }
    }

    /// Component teardown: persists the live snapshot and stops both tickers.
    pub async fn shutdown(&self) {
        self.cancel_ticker().await;
        self.cancel_rest_ticker().await;

        let session = {
            let mut state = self.state.lock().await;
            state.sync_elapsed();
            state.session.clone()
        };
        if let Some(session) = session {
            self.persist(&session).await;
        }
    }

    async fn end_rest(&self) -> bool {
        let was_resting = {
            let mut state = self.state.lock().await;
            state.rest.stop()
        };
        if was_resting {
            self.cancel_rest_ticker().await;
        }
        was_resting
    }

    async fn open_session(&self, workout_id: &str) -> Session {
        let now = Utc::now();
        if !self.connectivity.is_connected() {
            return Session::offline(workout_id, now);
        }
        let Some(token) = self.store.get_token().await else {
            warn!("No auth token; starting session locally");
            return Session::offline(workout_id, now);
        };

        match self.api.start_session(&token, workout_id).await {
            Ok(mut session) => {
                session.is_offline = false;
                session
            }
            Err(err) => {
                warn!("Remote session start failed ({err}); starting locally");
                Session::offline(workout_id, now)
            }
        }
    }

    /// Returns the backend's record, or `None` when the session has to be queued.
    async fn close_session(&self, session: &Session) -> Option<Session> {
        if session.is_offline || !self.connectivity.is_connected() {
            return None;
        }
        let token = self.store.get_token().await?;

        match self
            .api
            .end_session(&token, &session.id, &CompletionData::from(session))
            .await
        {
            Ok(confirmed) => Some(confirmed),
            Err(err) if err.is_transient() => {
                warn!("Remote session end failed for {} ({err}); queueing", session.id);
                None
            }
            Err(err) => {
                error!("Session {} could not be closed ({err}); queueing until signed in", session.id);
                None
            }
        }
    }

    async fn persist(&self, session: &Session) {
        if let Err(err) = self.store.set_active_session(session).await {
            warn!("Failed to persist session {}: {err}", session.id);
        }
    }

    async fn clear_persisted(&self) {
        if let Err(err) = self.store.clear_active_session().await {
            warn!("Failed to clear persisted session: {err}");
        }
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let state = self.state.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        let tick_interval = self.tick_interval;
        let persist_every = self.persist_every_ticks;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick_interval, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks: u32 = 0;

            loop {
                interval.tick().await;

                let session = {
                    let mut guard = state.lock().await;
                    if guard.phase != SessionPhase::Active {
                        break;
                    }
                    guard.sync_elapsed();
                    guard.session.clone()
                };
                let Some(session) = session else {
                    break;
                };

                let _ = events.send(SessionEvent::Tick {
                    elapsed_seconds: session.elapsed_seconds,
                });

                ticks = ticks.wrapping_add(1);
                if ticks % persist_every == 0 {
                    if let Err(err) = store.set_active_session(&session).await {
                        warn!("Failed to persist session {}: {err}", session.id);
                    }
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        let handle = self.ticker.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            // Wait for the abort to land so no stale snapshot is written afterwards.
            let _ = handle.await;
        }
    }

    async fn spawn_rest_ticker(&self) {
        let mut ticker_guard = self.rest_ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let state = self.state.clone();
        let events = self.events.clone();
        let tick_interval = self.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick_interval, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let remaining = {
                    let mut guard = state.lock().await;
                    if !guard.rest.is_resting {
                        break;
                    }
                    let remaining = guard.rest.remaining_secs();
                    if remaining == 0 {
                        guard.rest.stop();
                    }
                    remaining
                };

                if remaining == 0 {
                    let _ = events.send(SessionEvent::RestFinished { skipped: false });
                    break;
                }
                let _ = events.send(SessionEvent::RestTick {
                    remaining_secs: remaining,
                });
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_rest_ticker(&self) {
        let handle = self.rest_ticker.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
    }
}
