use std::sync::RwLock;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::{
    config::CoreConfig,
    error::{ApiError, DEFAULT_API_ERROR_MESSAGE},
    models::{
        AuthResponse, CompletionData, Exercise, HttpMethod, PendingRequest, ProfileUpdate,
        RegisterRequest, Session, User, UserGoals, Workout,
    },
};

use super::RemoteApi;

/// JSON-over-HTTP client for the fitness backend.
pub struct HttpApiClient {
    client: Client,
    base_url: RwLock<String>,
    fallback_urls: Vec<String>,
}

impl HttpApiClient {
    pub fn new(config: &CoreConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| ApiError::Network(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: RwLock::new(normalize_base(&config.api_base_url)),
            fallback_urls: config
                .fallback_api_urls
                .iter()
                .map(|url| normalize_base(url))
                .collect(),
        })
    }

    /// Base URL requests currently go to; changes when a login fallback host answers.
    pub fn base_url(&self) -> String {
        match self.base_url.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_base_url(&self, url: &str) {
        match self.base_url.write() {
            Ok(mut guard) => *guard = url.to_string(),
            Err(poisoned) => *poisoned.into_inner() = url.to_string(),
        }
    }

    async fn send_to(
        &self,
        base: &str,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Response, ApiError> {
        let url = format!("{base}{path}");
        debug!("{method} {url}");

        let mut request = self.client.request(method, &url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|err| {
            warn!("Request to {url} failed: {err}");
            ApiError::Network(err.to_string())
        })?;

        ensure_success(response).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Response, ApiError> {
        let base = self.base_url();
        self.send_to(&base, method, path, token, body).await
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let response = self.send(method, path, Some(token), body).await?;
        decode(response).await
    }
}

fn normalize_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn to_body<T: serde::Serialize + ?Sized>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|err| ApiError::Decode(err.to_string()))
}

fn to_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    warn!("Backend returned {status}: {message}");
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

/// The response's `message` field when there is one, else a fixed string.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_API_ERROR_MESSAGE.to_string())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    response
        .json::<T>()
        .await
        .map_err(|err| ApiError::Decode(err.to_string()))
}

#[async_trait]
impl RemoteApi for HttpApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ApiError> {
        let body = json!({ "email": email, "password": password });
        let primary = self.base_url();

        let err = match self
            .send_to(&primary, Method::POST, "/auth/login", None, Some(&body))
            .await
        {
            Ok(response) => return decode(response).await,
            Err(err) => err,
        };

        if !err.is_network() {
            return Err(err);
        }

        for host in self.fallback_urls.iter().filter(|host| **host != primary) {
            info!("Login host {primary} unreachable, probing {host}");
            match self
                .send_to(host, Method::POST, "/auth/login", None, Some(&body))
                .await
            {
                Ok(response) => {
                    self.set_base_url(host);
                    return decode(response).await;
                }
                Err(probe_err) if probe_err.is_network() => continue,
                Err(probe_err) => {
                    // The host answered, so it becomes the one to use even though login failed.
                    self.set_base_url(host);
                    return Err(probe_err);
                }
            }
        }

        Err(err)
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        let body = to_body(request)?;
        let response = self
            .send(Method::POST, "/auth/register", None, Some(&body))
            .await?;
        decode(response).await
    }

    async fn get_profile(&self, token: &str) -> Result<User, ApiError> {
        self.fetch(Method::GET, "/users/profile", token, None).await
    }

    async fn update_profile(&self, token: &str, update: &ProfileUpdate) -> Result<User, ApiError> {
        let body = to_body(update)?;
        self.fetch(Method::PUT, "/users/profile", token, Some(&body))
            .await
    }

    async fn update_goals(&self, token: &str, goals: &UserGoals) -> Result<UserGoals, ApiError> {
        let body = to_body(goals)?;
        self.fetch(Method::PUT, "/users/goals", token, Some(&body))
            .await
    }

    async fn get_workouts(&self, token: &str) -> Result<Vec<Workout>, ApiError> {
        self.fetch(Method::GET, "/workouts", token, None).await
    }

    async fn get_workout(&self, token: &str, workout_id: &str) -> Result<Workout, ApiError> {
        self.fetch(Method::GET, &format!("/workouts/{workout_id}"), token, None)
            .await
    }

    async fn create_workout(&self, token: &str, workout: &Workout) -> Result<Workout, ApiError> {
        let body = to_body(workout)?;
        self.fetch(Method::POST, "/workouts", token, Some(&body))
            .await
    }

    async fn update_workout(
        &self,
        token: &str,
        workout_id: &str,
        workout: &Workout,
    ) -> Result<Workout, ApiError> {
        let body = to_body(workout)?;
        self.fetch(
            Method::PUT,
            &format!("/workouts/{workout_id}"),
            token,
            Some(&body),
        )
        .await
    }

    async fn delete_workout(&self, token: &str, workout_id: &str) -> Result<(), ApiError> {
        self.send(
            Method::DELETE,
            &format!("/workouts/{workout_id}"),
            Some(token),
            None,
        )
        .await?;
        Ok(())
    }

    async fn get_exercises(&self, token: &str) -> Result<Vec<Exercise>, ApiError> {
        self.fetch(Method::GET, "/exercises", token, None).await
    }

    async fn start_session(&self, token: &str, workout_id: &str) -> Result<Session, ApiError> {
        let body = json!({ "workoutId": workout_id });
        self.fetch(Method::POST, "/sessions/start", token, Some(&body))
            .await
    }

    async fn end_session(
        &self,
        token: &str,
        session_id: &str,
        completion: &CompletionData,
    ) -> Result<Session, ApiError> {
        let body = to_body(completion)?;
        self.fetch(
            Method::PUT,
            &format!("/sessions/{session_id}/end"),
            token,
            Some(&body),
        )
        .await
    }

    async fn send_request(
        &self,
        token: &str,
        request: &PendingRequest,
    ) -> Result<Value, ApiError> {
        let response = self
            .send(
                to_method(request.method),
                &request.path,
                Some(token),
                request.body.as_ref(),
            )
            .await?;

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|err| ApiError::Decode(err.to_string()))
    }
}
