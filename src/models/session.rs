use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of session ids minted on the device before the backend has confirmed them.
pub const OFFLINE_SESSION_PREFIX: &str = "offline_session_";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Moderate,
    Hard,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Feeling {
    Great,
    Good,
    Okay,
    Tired,
    Exhausted,
}

/// One attempt at a workout, in progress or completed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub workout_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub elapsed_seconds: u64,
    /// Final duration in seconds, only set once the session is completed.
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub feeling: Option<Feeling>,
    #[serde(default)]
    pub is_offline: bool,
}

impl Session {
    /// A session created without the backend, id `offline_session_<millis>`.
    pub fn offline(workout_id: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            id: format!("{OFFLINE_SESSION_PREFIX}{}", start_time.timestamp_millis()),
            workout_id: workout_id.into(),
            start_time,
            end_time: None,
            is_paused: false,
            paused_at: None,
            elapsed_seconds: 0,
            duration: None,
            notes: String::new(),
            difficulty: None,
            feeling: None,
            is_offline: true,
        }
    }

    pub fn has_placeholder_id(&self) -> bool {
        self.id.starts_with(OFFLINE_SESSION_PREFIX)
    }

    pub fn is_ended(&self) -> bool {
        self.end_time.is_some()
    }

    /// Folds the user's completion input into the session. The duration always
    /// comes from the elapsed counter, never from the caller.
    pub fn apply_completion(&mut self, completion: &CompletionData) {
        if let Some(notes) = &completion.notes {
            self.notes = notes.clone();
        }
        if completion.difficulty.is_some() {
            self.difficulty = completion.difficulty;
        }
        if completion.feeling.is_some() {
            self.feeling = completion.feeling;
        }
        self.duration = Some(self.elapsed_seconds);
    }
}

/// What the user reports when finishing a workout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feeling: Option<Feeling>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl From<&Session> for CompletionData {
    fn from(session: &Session) -> Self {
        Self {
            notes: (!session.notes.is_empty()).then(|| session.notes.clone()),
            difficulty: session.difficulty,
            feeling: session.feeling,
            duration: Some(session.duration.unwrap_or(session.elapsed_seconds)),
        }
    }
}
