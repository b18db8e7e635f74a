use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::models::{CompletionData, Session};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Slot reserved while the backend is asked to open the session.
    Starting,
    Active,
    Paused,
}

/// Countdown between sets, independent of the session phase.
#[derive(Debug, Clone, Default)]
pub struct RestTimer {
    pub is_resting: bool,
    pub duration_secs: u64,
    anchor: Option<Instant>,
}

impl RestTimer {
    pub fn start(&mut self, duration_secs: u64, now: Instant) {
        self.is_resting = true;
        self.duration_secs = duration_secs;
        self.anchor = Some(now);
    }

    /// Returns whether a countdown was running.
    pub fn stop(&mut self) -> bool {
        let was_resting = self.is_resting;
        *self = Self::default();
        was_resting
    }

    pub fn remaining_secs(&self) -> u64 {
        match (self.is_resting, self.anchor) {
            (true, Some(anchor)) => self
                .duration_secs
                .saturating_sub(anchor.elapsed().as_secs()),
            _ => 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_resting && self.remaining_secs() > 0
    }
}

/// Single active-session slot plus its elapsed-time counter.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub session: Option<Session>,
    /// Active time accumulated before the current running window.
    active_ms_baseline: u64,
    running_anchor: Option<Instant>,
    pub rest: RestTimer,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_active_ms(&self) -> u64 {
        match (self.phase, self.running_anchor) {
            (SessionPhase::Active, Some(anchor)) => self
                .active_ms_baseline
                .saturating_add(anchor.elapsed().as_millis() as u64),
            _ => self.active_ms_baseline,
        }
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.current_active_ms() / 1000
    }

    pub fn sync_elapsed(&mut self) {
        let elapsed = self.elapsed_seconds();
        if let Some(session) = self.session.as_mut() {
            session.elapsed_seconds = elapsed;
        }
    }

    pub fn active_session_id(&self) -> Option<&str> {
        match self.phase {
            SessionPhase::Active | SessionPhase::Paused => {
                self.session.as_ref().map(|session| session.id.as_str())
            }
            _ => None,
        }
    }

    fn has_session(&self) -> bool {
        matches!(self.phase, SessionPhase::Active | SessionPhase::Paused)
    }

    /// Claims the idle slot ahead of the remote start. Returns false if it is taken.
    pub fn reserve(&mut self) -> bool {
        if self.phase != SessionPhase::Idle {
            return false;
        }
        self.phase = SessionPhase::Starting;
        true
    }

    /// Installs a session, counting from `started_at`.
    pub fn begin(&mut self, mut session: Session, started_at: Instant) {
        session.elapsed_seconds = 0;
        session.is_paused = false;
        session.paused_at = None;
        session.end_time = None;

        self.phase = SessionPhase::Active;
        self.session = Some(session);
        self.active_ms_baseline = 0;
        self.running_anchor = Some(started_at);
    }

    /// Freezes the counter. Returns false when there is no running session.
    pub fn pause(&mut self, at: DateTime<Utc>) -> bool {
        if self.phase != SessionPhase::Active {
            return false;
        }

        self.active_ms_baseline = self.current_active_ms();
        self.running_anchor = None;
        self.phase = SessionPhase::Paused;
        self.sync_elapsed();
        if let Some(session) = self.session.as_mut() {
            session.is_paused = true;
            session.paused_at = Some(at);
        }
        true
    }

    /// Restarts the counter from where it was frozen. Returns false unless paused.
    pub fn resume(&mut self, now: Instant) -> bool {
        if self.phase != SessionPhase::Paused {
            return false;
        }

        self.running_anchor = Some(now);
        self.phase = SessionPhase::Active;
        if let Some(session) = self.session.as_mut() {
            session.is_paused = false;
            session.paused_at = None;
        }
        true
    }

    /// Reloads a persisted session after a restart, frozen at its last elapsed value.
    pub fn restore(&mut self, mut session: Session, at: DateTime<Utc>) {
        session.is_paused = true;
        session.paused_at = session.paused_at.or(Some(at));

        self.active_ms_baseline = session.elapsed_seconds.saturating_mul(1000);
        self.running_anchor = None;
        self.phase = SessionPhase::Paused;
        self.session = Some(session);
    }

    /// Stops the counter, merges the completion input and empties the slot.
    pub fn finish(&mut self, at: DateTime<Utc>, completion: &CompletionData) -> Option<Session> {
        if !self.has_session() {
            return None;
        }

        self.sync_elapsed();
        let mut session = self.clear_slot()?;
        session.end_time = Some(at);
        session.is_paused = false;
        session.paused_at = None;
        session.apply_completion(completion);
        Some(session)
    }

    /// Drops the active session without completing it.
    pub fn cancel(&mut self) -> Option<Session> {
        if !self.has_session() {
            return None;
        }
        self.sync_elapsed();
        self.clear_slot()
    }

    fn clear_slot(&mut self) -> Option<Session> {
        self.phase = SessionPhase::Idle;
        self.active_ms_baseline = 0;
        self.running_anchor = None;
        self.session.take()
    }
}
