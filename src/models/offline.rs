use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{GoalUpdate, Session, Workout};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RecordKind {
    Workout,
    Session,
    Goal,
    Request,
}

impl RecordKind {
    /// Prefix of locally generated ids, `<prefix>_<epoch-millis>`.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            RecordKind::Workout => "workout",
            RecordKind::Session => "session",
            RecordKind::Goal => "goal",
            RecordKind::Request => "request",
        }
    }
}

/// Per-record outcome of the most recent sync pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RecordSyncState {
    #[default]
    Pending,
    Synced,
}

/// Local stand-in for an entity the backend has not confirmed yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OfflineRecord<T> {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub is_offline: bool,
    #[serde(default)]
    pub state: RecordSyncState,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub payload: T,
}

impl<T> OfflineRecord<T> {
    pub fn new(id: String, timestamp: DateTime<Utc>, payload: T) -> Self {
        Self {
            id,
            timestamp,
            is_offline: true,
            state: RecordSyncState::Pending,
            attempts: 0,
            last_error: None,
            payload,
        }
    }

    pub fn mark_synced(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
        self.state = RecordSyncState::Synced;
        self.last_error = None;
    }

    pub fn mark_failed(&mut self, error: String) {
        self.attempts = self.attempts.saturating_add(1);
        self.state = RecordSyncState::Pending;
        self.last_error = Some(error);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// A raw request descriptor replayed verbatim once connectivity returns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PendingRequest {
    pub method: HttpMethod,
    /// Path relative to the API base URL, e.g. `/workouts/42`.
    pub path: String,
    #[serde(default)]
    pub body: Option<Value>,
}

/// Everything stored under the offline-data key. Lists keep creation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct OfflineData {
    pub workouts: Vec<OfflineRecord<Workout>>,
    pub sessions: Vec<OfflineRecord<Session>>,
    pub goal_updates: Vec<OfflineRecord<GoalUpdate>>,
    pub pending_requests: Vec<OfflineRecord<PendingRequest>>,
}

impl OfflineData {
    pub fn is_empty(&self) -> bool {
        self.workouts.is_empty()
            && self.sessions.is_empty()
            && self.goal_updates.is_empty()
            && self.pending_requests.is_empty()
    }

    pub fn stats(&self) -> OfflineStats {
        OfflineStats {
            workouts: self.workouts.len(),
            sessions: self.sessions.len(),
            goal_updates: self.goal_updates.len(),
            pending_requests: self.pending_requests.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OfflineStats {
    pub workouts: usize,
    pub sessions: usize,
    pub goal_updates: usize,
    pub pending_requests: usize,
}

impl OfflineStats {
    pub fn total(&self) -> usize {
        self.workouts + self.sessions + self.goal_updates + self.pending_requests
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncedItem {
    pub kind: RecordKind,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub kind: RecordKind,
    pub id: String,
    pub error: String,
}

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub synced: Vec<SyncedItem>,
    pub errors: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_attempt_stays_pending_and_counts() {
        let mut record = OfflineRecord::new("goal_1".into(), Utc::now(), ());
        record.mark_failed("offline".into());
        record.mark_failed("still offline".into());

        assert_eq!(record.state, RecordSyncState::Pending);
        assert_eq!(record.attempts, 2);
        assert_eq!(record.last_error.as_deref(), Some("still offline"));

        record.mark_synced();
        assert_eq!(record.state, RecordSyncState::Synced);
        assert!(record.last_error.is_none());
    }

    #[test]
    fn older_snapshots_without_sync_state_still_parse() {
        let raw = r#"{
            "workouts": [],
            "sessions": [],
            "goalUpdates": [{
                "id": "goal_1700000000000",
                "timestamp": "2024-01-01T00:00:00Z",
                "isOffline": true,
                "payload": { "goals": { "weeklyWorkoutTarget": 4 }, "updatedAt": "2024-01-01T00:00:00Z" }
            }]
        }"#;
        let data: OfflineData = serde_json::from_str(raw).unwrap();
        assert_eq!(data.goal_updates[0].state, RecordSyncState::Pending);
        assert_eq!(data.stats().total(), 1);
        assert!(data.pending_requests.is_empty());
    }
}
