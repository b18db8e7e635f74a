use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use crate::{
    connectivity::ConnectivityHook,
    error::{ApiError, StorageError},
    models::{
        GoalUpdate, OfflineData, OfflineRecord, OfflineStats, PendingRequest, RecordKind,
        RecordSyncState, Session, SyncFailure, SyncReport, SyncedItem, Workout,
    },
    storage::LocalStore,
};

use super::backend::SyncBackend;

/// Issues `<kind>_<epoch-millis>` ids, bumping the millis when two ids would collide.
#[derive(Default)]
struct RecordIdGenerator {
    last_millis: AtomicI64,
}

impl RecordIdGenerator {
    fn next(&self, kind: RecordKind, now: DateTime<Utc>) -> String {
        let candidate = now.timestamp_millis();
        let mut last = self.last_millis.load(Ordering::SeqCst);
        loop {
            let next = candidate.max(last + 1);
            match self
                .last_millis
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return format!("{}_{next}", kind.id_prefix()),
                Err(actual) => last = actual,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassScope {
    AllBuckets,
    PendingRequests,
}

/// Payloads the queue knows how to hand to a [`SyncBackend`]. A failed replay
/// may still have updated the payload, and the update is kept for the next pass.
#[async_trait]
trait Replay: Send + Sync {
    async fn replay(&mut self, backend: &dyn SyncBackend) -> Result<(), ApiError>;
}

#[async_trait]
impl Replay for Workout {
    async fn replay(&mut self, backend: &dyn SyncBackend) -> Result<(), ApiError> {
        backend.push_workout(self).await
    }
}

#[async_trait]
impl Replay for Session {
    async fn replay(&mut self, backend: &dyn SyncBackend) -> Result<(), ApiError> {
        backend.push_session(self).await
    }
}

#[async_trait]
impl Replay for GoalUpdate {
    async fn replay(&mut self, backend: &dyn SyncBackend) -> Result<(), ApiError> {
        backend.push_goal_update(self).await
    }
}

#[async_trait]
impl Replay for PendingRequest {
    async fn replay(&mut self, backend: &dyn SyncBackend) -> Result<(), ApiError> {
        backend.replay_request(self).await
    }
}

/// Buffers mutations the backend has not confirmed and replays them in single best-effort passes.
///
/// A pass attempts every queued record once. Records that go through are
/// dropped; the rest stay pending until the next pass. There is no backoff
/// and no retry limit.
pub struct OfflineQueue {
    store: LocalStore,
    backend: Arc<dyn SyncBackend>,
    ids: RecordIdGenerator,
    /// Serializes read-modify-write of the offline-data key.
    data_lock: Mutex<()>,
    /// Serializes sync passes.
    pass_lock: Mutex<()>,
}

impl OfflineQueue {
    pub fn new(store: LocalStore, backend: Arc<dyn SyncBackend>) -> Self {
        Self {
            store,
            backend,
            ids: RecordIdGenerator::default(),
            data_lock: Mutex::new(()),
            pass_lock: Mutex::new(()),
        }
    }

    fn stamp<T>(&self, kind: RecordKind, payload: T) -> OfflineRecord<T> {
        let now = Utc::now();
        OfflineRecord::new(self.ids.next(kind, now), now, payload)
    }

    async fn mutate<F>(&self, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut OfflineData),
    {
        let _guard = self.data_lock.lock().await;
        let mut data = self.store.try_get_offline_data().await?;
        apply(&mut data);
        self.store.set_offline_data(&data).await
    }

    pub async fn save_offline_workout(
        &self,
        workout: Workout,
    ) -> Result<OfflineRecord<Workout>, StorageError> {
        let record = self.stamp(RecordKind::Workout, workout);
        let stored = record.clone();
        self.mutate(|data| data.workouts.push(stored)).await?;
        info!("Queued offline workout {}", record.id);
        Ok(record)
    }

    pub async fn save_offline_workout_session(
        &self,
        mut session: Session,
    ) -> Result<OfflineRecord<Session>, StorageError> {
        session.is_offline = true;
        let record = self.stamp(RecordKind::Session, session);
        let stored = record.clone();
        self.mutate(|data| data.sessions.push(stored)).await?;
        info!(
            "Queued offline session {} (workout {})",
            record.id, record.payload.workout_id
        );
        Ok(record)
    }

    pub async fn save_offline_goal_update(
        &self,
        update: GoalUpdate,
    ) -> Result<OfflineRecord<GoalUpdate>, StorageError> {
        let record = self.stamp(RecordKind::Goal, update);
        let stored = record.clone();
        self.mutate(|data| data.goal_updates.push(stored)).await?;
        info!("Queued offline goal update {}", record.id);
        Ok(record)
    }

    pub async fn queue_request(
        &self,
        request: PendingRequest,
    ) -> Result<OfflineRecord<PendingRequest>, StorageError> {
        let record = self.stamp(RecordKind::Request, request);
        let stored = record.clone();
        self.mutate(|data| data.pending_requests.push(stored)).await?;
        info!(
            "Queued {} {} for replay",
            record.payload.method.as_str(),
            record.payload.path
        );
        Ok(record)
    }

    /// One pass over all four buckets.
    pub async fn sync_offline_data(&self) -> Result<SyncReport, StorageError> {
        self.run_pass(PassScope::AllBuckets).await
    }

    /// One pass over the pending raw requests only.
    pub async fn retry_failed_requests(&self) -> Result<SyncReport, StorageError> {
        self.run_pass(PassScope::PendingRequests).await
    }

    pub async fn get_offline_stats(&self) -> OfflineStats {
        self.store.get_offline_data().await.stats()
    }

    pub async fn get_offline_data(&self) -> OfflineData {
        self.store.get_offline_data().await
    }

    pub async fn clear_offline_data(&self) -> Result<(), StorageError> {
        let _guard = self.data_lock.lock().await;
        self.store.remove(&self.store.keys().offline_data).await
    }

    async fn run_pass(&self, scope: PassScope) -> Result<SyncReport, StorageError> {
        let _pass = self.pass_lock.lock().await;

        let snapshot = {
            let _guard = self.data_lock.lock().await;
            self.store.try_get_offline_data().await?
        };
        let mut attempted = match scope {
            PassScope::AllBuckets => snapshot,
            PassScope::PendingRequests => OfflineData {
                pending_requests: snapshot.pending_requests,
                ..OfflineData::default()
            },
        };

        if attempted.is_empty() {
            debug!("Nothing queued offline; skipping {scope:?} pass");
            return Ok(SyncReport::default());
        }

        let mut report = SyncReport::default();
        self.replay_bucket(&mut attempted.workouts, RecordKind::Workout, &mut report)
            .await;
        self.replay_bucket(&mut attempted.sessions, RecordKind::Session, &mut report)
            .await;
        self.replay_bucket(&mut attempted.goal_updates, RecordKind::Goal, &mut report)
            .await;
        self.replay_bucket(
            &mut attempted.pending_requests,
            RecordKind::Request,
            &mut report,
        )
        .await;

        self.reconcile(attempted).await?;

        if report.is_success() {
            info!("Sync pass complete: {} records synced", report.synced.len());
        } else {
            warn!(
                "Sync pass finished with {} synced, {} still pending",
                report.synced.len(),
                report.errors.len()
            );
        }
        Ok(report)
    }

    async fn replay_bucket<T: Replay>(
        &self,
        records: &mut [OfflineRecord<T>],
        kind: RecordKind,
        report: &mut SyncReport,
    ) {
        for record in records.iter_mut() {
            match record.payload.replay(self.backend.as_ref()).await {
                Ok(()) => {
                    record.mark_synced();
                    report.synced.push(SyncedItem {
                        kind,
                        id: record.id.clone(),
                    });
                }
                Err(err) => {
                    debug!("Replay of {} failed: {err}", record.id);
                    record.mark_failed(err.to_string());
                    report.errors.push(SyncFailure {
                        kind,
                        id: record.id.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
    }

    /// Applies pass outcomes to what is stored now, so records queued during the pass survive.
    async fn reconcile(&self, attempted: OfflineData) -> Result<(), StorageError> {
        let _guard = self.data_lock.lock().await;
        let mut current = self.store.try_get_offline_data().await?;

        merge_outcomes(&mut current.workouts, attempted.workouts);
        merge_outcomes(&mut current.sessions, attempted.sessions);
        merge_outcomes(&mut current.goal_updates, attempted.goal_updates);
        merge_outcomes(&mut current.pending_requests, attempted.pending_requests);

        if current.is_empty() {
            self.store.remove(&self.store.keys().offline_data).await
        } else {
            self.store.set_offline_data(&current).await
        }
    }
}

fn merge_outcomes<T>(current: &mut Vec<OfflineRecord<T>>, attempted: Vec<OfflineRecord<T>>) {
    let mut outcomes: HashMap<String, OfflineRecord<T>> = attempted
        .into_iter()
        .map(|record| (record.id.clone(), record))
        .collect();

    current.retain_mut(|record| match outcomes.remove(&record.id) {
        Some(outcome) if outcome.state == RecordSyncState::Synced => false,
        Some(outcome) => {
            *record = outcome;
            true
        }
        None => true,
    });
}

#[async_trait]
impl ConnectivityHook for OfflineQueue {
    async fn on_connected(&self) {
        if let Err(err) = self.sync_offline_data().await {
            error!("Offline sync pass failed to run: {err}");
        }
        if let Err(err) = self.retry_failed_requests().await {
            error!("Pending request retry failed to run: {err}");
        }
    }

    async fn on_disconnected(&self) {
        info!("Offline; mutations will be queued locally");
    }
}
