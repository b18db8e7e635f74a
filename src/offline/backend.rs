use std::sync::Arc;

use async_trait::async_trait;
use log::info;

use crate::{
    api::RemoteApi,
    error::ApiError,
    models::{CompletionData, GoalUpdate, PendingRequest, Session, Workout},
    storage::LocalStore,
};

/// Replays one queued record against the backend.
#[async_trait]
pub trait SyncBackend: Send + Sync {
    async fn push_workout(&self, workout: &Workout) -> Result<(), ApiError>;

    /// May rewrite `session.id` once the backend has assigned one, even when
    /// the push fails afterwards.
    async fn push_session(&self, session: &mut Session) -> Result<(), ApiError>;

    async fn push_goal_update(&self, update: &GoalUpdate) -> Result<(), ApiError>;

    async fn replay_request(&self, request: &PendingRequest) -> Result<(), ApiError>;
}

/// [`SyncBackend`] over the real API client, authenticated with the stored token.
pub struct ApiReplay {
    api: Arc<dyn RemoteApi>,
    store: LocalStore,
}

impl ApiReplay {
    pub fn new(api: Arc<dyn RemoteApi>, store: LocalStore) -> Self {
        Self { api, store }
    }

    async fn token(&self) -> Result<String, ApiError> {
        self.store.get_token().await.ok_or(ApiError::NotAuthenticated)
    }
}

#[async_trait]
impl SyncBackend for ApiReplay {
    async fn push_workout(&self, workout: &Workout) -> Result<(), ApiError> {
        let token = self.token().await?;
        self.api.create_workout(&token, workout).await?;
        Ok(())
    }

    async fn push_session(&self, session: &mut Session) -> Result<(), ApiError> {
        let token = self.token().await?;

        // Placeholder ids were never seen by the backend, so the session is opened first.
        if session.has_placeholder_id() {
            let opened = self.api.start_session(&token, &session.workout_id).await?;
            info!(
                "Opened server session {} for queued {}",
                opened.id, session.id
            );
            session.id = opened.id;
        }

        let completion = CompletionData::from(&*session);
        self.api
            .end_session(&token, &session.id, &completion)
            .await?;
        Ok(())
    }

    async fn push_goal_update(&self, update: &GoalUpdate) -> Result<(), ApiError> {
        let token = self.token().await?;
        self.api.update_goals(&token, &update.goals).await?;
        Ok(())
    }

    async fn replay_request(&self, request: &PendingRequest) -> Result<(), ApiError> {
        let token = self.token().await?;
        self.api.send_request(&token, request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HttpMethod, UserGoals};
    use crate::test_utils::{memory_store, FakeApi};
    use chrono::Utc;

    #[tokio::test]
    async fn placeholder_sessions_are_opened_before_closing() {
        let api = FakeApi::new(true);
        let (_, store) = memory_store();
        store.set_token("token-1").await.unwrap();
        let replay = ApiReplay::new(api.clone(), store);

        let mut session = Session::offline("w7", Utc::now());
        session.elapsed_seconds = 600;
        replay.push_session(&mut session).await.unwrap();

        assert_eq!(*api.started.lock().unwrap(), vec!["w7".to_string()]);
        assert!(!session.has_placeholder_id());
        let ended = api.ended.lock().unwrap();
        assert_eq!(ended[0].0, session.id);
        assert_eq!(ended[0].1.duration, Some(600));
    }

    #[tokio::test]
    async fn server_sessions_are_only_closed() {
        let api = FakeApi::new(true);
        let (_, store) = memory_store();
        store.set_token("token-1").await.unwrap();
        let replay = ApiReplay::new(api.clone(), store);

        let mut session = Session::offline("w7", Utc::now());
        session.id = "s42".into();
        replay.push_session(&mut session).await.unwrap();

        assert!(api.started.lock().unwrap().is_empty());
        assert_eq!(api.ended.lock().unwrap()[0].0, "s42");
    }

    #[tokio::test]
    async fn failed_close_keeps_the_opened_server_id() {
        let api = FakeApi::new(true);
        api.set_end_failing(true);
        let (_, store) = memory_store();
        store.set_token("token-1").await.unwrap();
        let replay = ApiReplay::new(api.clone(), store);

        let mut session = Session::offline("w7", Utc::now());
        assert!(replay.push_session(&mut session).await.is_err());
        assert_eq!(session.id, "s1");

        assert!(replay.push_session(&mut session).await.is_err());
        assert_eq!(api.started.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_token_fails_the_record() {
        let api = FakeApi::new(true);
        let (_, store) = memory_store();
        let replay = ApiReplay::new(api.clone(), store);

        let err = replay
            .replay_request(&PendingRequest {
                method: HttpMethod::Delete,
                path: "/workouts/w1".into(),
                body: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err, ApiError::NotAuthenticated);
        assert!(api.replayed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn goal_updates_and_workouts_map_to_their_endpoints() {
        let api = FakeApi::new(true);
        let (_, store) = memory_store();
        store.set_token("token-1").await.unwrap();
        let replay = ApiReplay::new(api.clone(), store);

        replay
            .push_goal_update(&GoalUpdate {
                goals: UserGoals {
                    weekly_workout_target: Some(4),
                    ..UserGoals::default()
                },
                updated_at: Utc::now(),
            })
            .await
            .unwrap();
        replay.push_workout(&Workout::new("Core")).await.unwrap();

        assert_eq!(api.goal_updates.lock().unwrap()[0].weekly_workout_target, Some(4));
        assert_eq!(api.created_workouts.lock().unwrap()[0].name, "Core");
    }
}
