//! Shared fakes for unit tests.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::{
    api::RemoteApi,
    error::ApiError,
    models::{
        AuthResponse, CompletionData, Exercise, PendingRequest, ProfileUpdate, RegisterRequest,
        Session, User, UserGoals, Workout,
    },
    storage::{LocalStore, MemoryStore},
};

/// In-memory backend that can be switched offline.
pub struct FakeApi {
    online: AtomicBool,
    end_failing: AtomicBool,
    start_delay_ms: AtomicU64,
    next_id: AtomicUsize,
    pub started: Mutex<Vec<String>>,
    pub ended: Mutex<Vec<(String, CompletionData)>>,
    pub created_workouts: Mutex<Vec<Workout>>,
    pub goal_updates: Mutex<Vec<UserGoals>>,
    pub replayed: Mutex<Vec<PendingRequest>>,
}

impl FakeApi {
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(Self {
            online: AtomicBool::new(online),
            end_failing: AtomicBool::new(false),
            start_delay_ms: AtomicU64::new(0),
            next_id: AtomicUsize::new(1),
            started: Mutex::new(Vec::new()),
            ended: Mutex::new(Vec::new()),
            created_workouts: Mutex::new(Vec::new()),
            goal_updates: Mutex::new(Vec::new()),
            replayed: Mutex::new(Vec::new()),
        })
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Makes `end_session` answer 500 while everything else keeps working.
    pub fn set_end_failing(&self, failing: bool) {
        self.end_failing.store(failing, Ordering::SeqCst);
    }

    /// Delays `start_session` responses, as a slow network would.
    pub fn set_start_delay(&self, delay: Duration) {
        self.start_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ApiError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ApiError::Network("network request failed".into()))
        }
    }

    fn user() -> User {
        User {
            id: "u1".into(),
            name: "Sam".into(),
            email: "sam@example.com".into(),
            goals: None,
        }
    }
}

pub fn memory_store() -> (Arc<MemoryStore>, LocalStore) {
    let memory = Arc::new(MemoryStore::new());
    let store = LocalStore::new(memory.clone(), "@test");
    (memory, store)
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn login(&self, _email: &str, _password: &str) -> Result<AuthResponse, ApiError> {
        self.check()?;
        Ok(AuthResponse {
            token: "token-1".into(),
            user: Self::user(),
        })
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        self.check()?;
        Ok(AuthResponse {
            token: "token-1".into(),
            user: User {
                name: request.name.clone(),
                email: request.email.clone(),
                ..Self::user()
            },
        })
    }

    async fn get_profile(&self, _token: &str) -> Result<User, ApiError> {
        self.check()?;
        Ok(Self::user())
    }

    async fn update_profile(&self, _token: &str, update: &ProfileUpdate) -> Result<User, ApiError> {
        self.check()?;
        let mut user = Self::user();
        if let Some(name) = &update.name {
            user.name = name.clone();
        }
        Ok(user)
    }

    async fn update_goals(&self, _token: &str, goals: &UserGoals) -> Result<UserGoals, ApiError> {
        self.check()?;
        self.goal_updates.lock().unwrap().push(goals.clone());
        Ok(goals.clone())
    }

    async fn get_workouts(&self, _token: &str) -> Result<Vec<Workout>, ApiError> {
        self.check()?;
        Ok(self.created_workouts.lock().unwrap().clone())
    }

    async fn get_workout(&self, _token: &str, workout_id: &str) -> Result<Workout, ApiError> {
        self.check()?;
        self.created_workouts
            .lock()
            .unwrap()
            .iter()
            .find(|workout| workout.id == workout_id)
            .cloned()
            .ok_or(ApiError::Status {
                status: 404,
                message: "Workout not found".into(),
            })
    }

    async fn create_workout(&self, _token: &str, workout: &Workout) -> Result<Workout, ApiError> {
        self.check()?;
        let mut created = workout.clone();
        created.id = format!("w{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.created_workouts.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_workout(
        &self,
        _token: &str,
        workout_id: &str,
        workout: &Workout,
    ) -> Result<Workout, ApiError> {
        self.check()?;
        let mut updated = workout.clone();
        updated.id = workout_id.to_string();
        Ok(updated)
    }

    async fn delete_workout(&self, _token: &str, _workout_id: &str) -> Result<(), ApiError> {
        self.check()
    }

    async fn get_exercises(&self, _token: &str) -> Result<Vec<Exercise>, ApiError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn start_session(&self, _token: &str, workout_id: &str) -> Result<Session, ApiError> {
        let delay = self.start_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.check()?;
        self.started.lock().unwrap().push(workout_id.to_string());
        let mut session = Session::offline(workout_id, Utc::now());
        session.id = format!("s{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        session.is_offline = false;
        Ok(session)
    }

    async fn end_session(
        &self,
        _token: &str,
        session_id: &str,
        completion: &CompletionData,
    ) -> Result<Session, ApiError> {
        self.check()?;
        if self.end_failing.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 500,
                message: "Internal server error".into(),
            });
        }
        self.ended
            .lock()
            .unwrap()
            .push((session_id.to_string(), completion.clone()));
        let mut session = Session::offline("server", Utc::now());
        session.id = session_id.to_string();
        session.is_offline = false;
        session.end_time = Some(Utc::now());
        session.duration = completion.duration;
        Ok(session)
    }

    async fn send_request(
        &self,
        _token: &str,
        request: &PendingRequest,
    ) -> Result<Value, ApiError> {
        self.check()?;
        self.replayed.lock().unwrap().push(request.clone());
        Ok(Value::Null)
    }
}
