//! Remote backend access.

mod http;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    error::ApiError,
    models::{
        AuthResponse, CompletionData, Exercise, PendingRequest, ProfileUpdate, RegisterRequest,
        Session, User, UserGoals, Workout,
    },
};

pub use http::HttpApiClient;

/// Request surface the core consumes. Every authenticated call carries a bearer token.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError>;

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError>;

    async fn get_profile(&self, token: &str) -> Result<User, ApiError>;

    async fn update_profile(&self, token: &str, update: &ProfileUpdate) -> Result<User, ApiError>;

    async fn update_goals(&self, token: &str, goals: &UserGoals) -> Result<UserGoals, ApiError>;

    async fn get_workouts(&self, token: &str) -> Result<Vec<Workout>, ApiError>;

    async fn get_workout(&self, token: &str, workout_id: &str) -> Result<Workout, ApiError>;

    async fn create_workout(&self, token: &str, workout: &Workout) -> Result<Workout, ApiError>;

    async fn update_workout(
        &self,
        token: &str,
        workout_id: &str,
        workout: &Workout,
    ) -> Result<Workout, ApiError>;

    async fn delete_workout(&self, token: &str, workout_id: &str) -> Result<(), ApiError>;

    async fn get_exercises(&self, token: &str) -> Result<Vec<Exercise>, ApiError>;

    async fn start_session(&self, token: &str, workout_id: &str) -> Result<Session, ApiError>;

    async fn end_session(
        &self,
        token: &str,
        session_id: &str,
        completion: &CompletionData,
    ) -> Result<Session, ApiError>;

    /// Sends a queued request descriptor as-is and returns the raw JSON body.
    async fn send_request(&self, token: &str, request: &PendingRequest)
        -> Result<Value, ApiError>;
}
