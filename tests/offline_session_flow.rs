use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use fitsync::{
    models::{
        AuthResponse, CompletionData, Difficulty, Exercise, PendingRequest, ProfileUpdate,
        RegisterRequest, Session, User, UserGoals, Workout,
    },
    ApiError, ChannelNetworkSource, CoreConfig, FitnessCore, MemoryStore, NetworkEvent,
    RemoteApi,
};
use serde_json::Value;
use tokio::{sync::mpsc, time::sleep};

/// Backend double that records session traffic.
#[derive(Default)]
struct RecordingApi {
    offline: AtomicBool,
    started: Mutex<Vec<String>>,
    ended: Mutex<Vec<(String, CompletionData)>>,
}

impl RecordingApi {
    fn reachable(&self) -> Result<(), ApiError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(ApiError::Network("connection refused".into()))
        } else {
            Ok(())
        }
    }

    fn user() -> User {
        User {
            id: "u1".into(),
            name: "Alex".into(),
            email: "alex@example.com".into(),
            goals: None,
        }
    }
}

#[async_trait]
impl RemoteApi for RecordingApi {
    async fn login(&self, _email: &str, _password: &str) -> Result<AuthResponse, ApiError> {
        self.reachable()?;
        Ok(AuthResponse {
            token: "jwt".into(),
            user: Self::user(),
        })
    }

    async fn register(&self, _request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        self.login("", "").await
    }

    async fn get_profile(&self, _token: &str) -> Result<User, ApiError> {
        self.reachable()?;
        Ok(Self::user())
    }

    async fn update_profile(&self, _token: &str, _update: &ProfileUpdate) -> Result<User, ApiError> {
        self.get_profile("").await
    }

    async fn update_goals(&self, _token: &str, goals: &UserGoals) -> Result<UserGoals, ApiError> {
        self.reachable()?;
        Ok(goals.clone())
    }

    async fn get_workouts(&self, _token: &str) -> Result<Vec<Workout>, ApiError> {
        self.reachable()?;
        Ok(Vec::new())
    }

    async fn get_workout(&self, _token: &str, workout_id: &str) -> Result<Workout, ApiError> {
        self.reachable()?;
        Err(ApiError::Status {
            status: 404,
            message: format!("Workout {workout_id} not found"),
        })
    }

    async fn create_workout(&self, _token: &str, workout: &Workout) -> Result<Workout, ApiError> {
        self.reachable()?;
        Ok(workout.clone())
    }

    async fn update_workout(
        &self,
        _token: &str,
        _workout_id: &str,
        workout: &Workout,
    ) -> Result<Workout, ApiError> {
        self.reachable()?;
        Ok(workout.clone())
    }

    async fn delete_workout(&self, _token: &str, _workout_id: &str) -> Result<(), ApiError> {
        self.reachable()
    }

    async fn get_exercises(&self, _token: &str) -> Result<Vec<Exercise>, ApiError> {
        self.reachable()?;
        Ok(Vec::new())
    }

    async fn start_session(&self, _token: &str, workout_id: &str) -> Result<Session, ApiError> {
        self.reachable()?;
        let mut started = self.started.lock().unwrap();
        started.push(workout_id.to_string());
        let mut session = Session::offline(workout_id, Utc::now());
        session.id = format!("server-{}", started.len());
        session.is_offline = false;
        Ok(session)
    }

    async fn end_session(
        &self,
        _token: &str,
        session_id: &str,
        completion: &CompletionData,
    ) -> Result<Session, ApiError> {
        self.reachable()?;
        self.ended
            .lock()
            .unwrap()
            .push((session_id.to_string(), completion.clone()));
        let mut session = Session::offline("w1", Utc::now());
        session.id = session_id.to_string();
        session.is_offline = false;
        session.duration = completion.duration;
        Ok(session)
    }

    async fn send_request(
        &self,
        _token: &str,
        _request: &PendingRequest,
    ) -> Result<Value, ApiError> {
        self.reachable()?;
        Ok(Value::Null)
    }
}

fn workout(id: &str) -> Workout {
    Workout {
        id: id.into(),
        ..Workout::new("Upper body")
    }
}

#[tokio::test(start_paused = true)]
async fn offline_workout_is_queued_then_synced_on_reconnect() {
    let api = Arc::new(RecordingApi::default());
    let network = Arc::new(ChannelNetworkSource::new(false));
    let core = FitnessCore::assemble(
        CoreConfig::default(),
        Arc::new(MemoryStore::new()),
        api.clone(),
        network.clone(),
    )
    .await
    .unwrap();
    core.store().set_token("jwt").await.unwrap();
    assert!(!core.connectivity().is_connected());

    let sessions = core.sessions();
    let started = sessions.start_workout(&workout("w1")).await.unwrap();
    assert!(started.is_offline);

    sleep(Duration::from_secs(10)).await;
    sessions.pause_workout().await.unwrap();
    sleep(Duration::from_secs(5)).await;
    sessions.resume_workout().await.unwrap();
    sleep(Duration::from_secs(10)).await;

    let outcome = sessions
        .end_workout(CompletionData {
            difficulty: Some(Difficulty::Hard),
            ..CompletionData::default()
        })
        .await
        .unwrap();

    assert!(outcome.is_queued());
    assert_eq!(outcome.session().duration, Some(20));
    assert!(core.store().get_active_session().await.is_none());
    let stats = core.offline_queue().get_offline_stats().await;
    assert_eq!(stats.sessions, 1);
    assert!(api.ended.lock().unwrap().is_empty());

    // The listener fires after the reconnect hook has finished its sync pass.
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _unsubscribe = core.connectivity().add_listener(move |event: &NetworkEvent| {
        let _ = tx.send(event.is_connected);
    });
    network.publish(NetworkEvent::connected());
    assert_eq!(rx.recv().await, Some(true));

    assert_eq!(core.offline_queue().get_offline_stats().await.total(), 0);
    assert_eq!(*api.started.lock().unwrap(), vec!["w1".to_string()]);
    let ended = api.ended.lock().unwrap().clone();
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].0, "server-1");
    assert_eq!(ended[0].1.duration, Some(20));
    assert_eq!(ended[0].1.difficulty, Some(Difficulty::Hard));

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_sync_keeps_the_session_for_the_next_edge() {
    let api = Arc::new(RecordingApi::default());
    api.offline.store(true, Ordering::SeqCst);
    let network = Arc::new(ChannelNetworkSource::new(false));
    let core = FitnessCore::assemble(
        CoreConfig::default(),
        Arc::new(MemoryStore::new()),
        api.clone(),
        network.clone(),
    )
    .await
    .unwrap();
    core.store().set_token("jwt").await.unwrap();

    core.sessions().start_workout(&workout("w9")).await.unwrap();
    sleep(Duration::from_secs(3)).await;
    core.sessions()
        .end_workout(CompletionData::default())
        .await
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _unsubscribe = core.connectivity().add_listener(move |event: &NetworkEvent| {
        let _ = tx.send(event.is_connected);
    });

    // Device reports online but the backend is still unreachable.
    network.publish(NetworkEvent::connected());
    assert_eq!(rx.recv().await, Some(true));
    let data = core.offline_queue().get_offline_data().await;
    assert_eq!(data.sessions.len(), 1);
    assert_eq!(data.sessions[0].attempts, 1);
    assert!(data.sessions[0].last_error.is_some());

    network.publish(NetworkEvent::disconnected());
    assert_eq!(rx.recv().await, Some(false));
    api.offline.store(false, Ordering::SeqCst);
    network.publish(NetworkEvent::connected());
    assert_eq!(rx.recv().await, Some(true));

    assert_eq!(core.offline_queue().get_offline_stats().await.total(), 0);
    assert_eq!(api.ended.lock().unwrap()[0].1.duration, Some(3));

    core.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unfinished_session_is_recovered_paused_on_startup() {
    let backend = Arc::new(MemoryStore::new());
    let network = Arc::new(ChannelNetworkSource::new(true));
    let api = Arc::new(RecordingApi::default());

    let first = FitnessCore::assemble(
        CoreConfig::default(),
        backend.clone(),
        api.clone(),
        network.clone(),
    )
    .await
    .unwrap();
    first.store().set_token("jwt").await.unwrap();
    first.sessions().start_workout(&workout("w4")).await.unwrap();
    sleep(Duration::from_millis(7_400)).await;
    first.shutdown().await;

    let second = FitnessCore::assemble(CoreConfig::default(), backend, api, network)
        .await
        .unwrap();
    let snapshot = second.sessions().get_snapshot().await;
    assert_eq!(snapshot.phase, fitsync::SessionPhase::Paused);
    assert_eq!(snapshot.elapsed_seconds, 7);
    assert_eq!(snapshot.session.unwrap().id, "server-1");

    second.shutdown().await;
}
