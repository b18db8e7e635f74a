//! Data model shared by the store, the API client and the services.
//!
//! Everything serializes to camelCase JSON, the format the backend and the
//! persisted key-value entries use.

pub mod offline;
pub mod session;
pub mod user;
pub mod workout;

pub use offline::{
    HttpMethod, OfflineData, OfflineRecord, OfflineStats, PendingRequest, RecordKind,
    RecordSyncState, SyncFailure, SyncReport, SyncedItem,
};
pub use session::{CompletionData, Difficulty, Feeling, Session, OFFLINE_SESSION_PREFIX};
pub use user::{
    AppSettings, AuthResponse, GoalUpdate, ProfileUpdate, RegisterRequest, UnitSystem, User,
    UserGoals,
};
pub use workout::{Exercise, Workout, WorkoutExercise};
