use std::sync::Arc;

use log::warn;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::StorageError,
    models::{AppSettings, OfflineData, Session, User, UserGoals},
};

use super::KeyValueStore;

/// Fully qualified keys, `<namespace>:<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub auth_token: String,
    pub user: String,
    pub active_session: String,
    pub goals: String,
    pub settings: String,
    pub onboarding_complete: String,
    pub offline_data: String,
}

impl StorageKeys {
    pub fn new(namespace: &str) -> Self {
        let key = |name: &str| format!("{namespace}:{name}");
        Self {
            auth_token: key("auth_token"),
            user: key("user"),
            active_session: key("active_workout_session"),
            goals: key("user_goals"),
            settings: key("app_settings"),
            onboarding_complete: key("onboarding_complete"),
            offline_data: key("offline_data"),
        }
    }

    pub fn all(&self) -> Vec<String> {
        vec![
            self.auth_token.clone(),
            self.user.clone(),
            self.active_session.clone(),
            self.goals.clone(),
            self.settings.clone(),
            self.onboarding_complete.clone(),
            self.offline_data.clone(),
        ]
    }
}

/// Typed facade over a [`KeyValueStore`].
///
/// Convenience reads log failures and fall back to an empty value so screens
/// keep rendering; writes report their errors.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KeyValueStore>,
    keys: Arc<StorageKeys>,
}

impl LocalStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, namespace: &str) -> Self {
        Self {
            backend,
            keys: Arc::new(StorageKeys::new(namespace)),
        }
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    pub async fn try_get_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        match self.backend.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get_json(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!("Failed to read {key} from local store: {err}");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StorageError> {
        let serialized = serde_json::to_string(value)?;
        self.backend.set(key, serialized).await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.backend.remove(key).await?;
        Ok(())
    }

    pub async fn get_token(&self) -> Option<String> {
        self.get_json(&self.keys.auth_token).await
    }

    pub async fn set_token(&self, token: &str) -> Result<(), StorageError> {
        self.set_json(&self.keys.auth_token, token).await
    }

    pub async fn get_user(&self) -> Option<User> {
        self.get_json(&self.keys.user).await
    }

    pub async fn set_user(&self, user: &User) -> Result<(), StorageError> {
        self.set_json(&self.keys.user, user).await
    }

    /// Logout: drops the token and the cached user together.
    pub async fn clear_auth(&self) -> Result<(), StorageError> {
        self.backend
            .multi_remove(&[self.keys.auth_token.clone(), self.keys.user.clone()])
            .await?;
        Ok(())
    }

    pub async fn get_active_session(&self) -> Option<Session> {
        self.get_json(&self.keys.active_session).await
    }

    pub async fn set_active_session(&self, session: &Session) -> Result<(), StorageError> {
        self.set_json(&self.keys.active_session, session).await
    }

    pub async fn clear_active_session(&self) -> Result<(), StorageError> {
        self.remove(&self.keys.active_session).await
    }

    pub async fn get_goals(&self) -> Option<UserGoals> {
        self.get_json(&self.keys.goals).await
    }

    pub async fn set_goals(&self, goals: &UserGoals) -> Result<(), StorageError> {
        self.set_json(&self.keys.goals, goals).await
    }

    pub async fn get_settings(&self) -> AppSettings {
        self.get_json(&self.keys.settings).await.unwrap_or_default()
    }

    pub async fn set_settings(&self, settings: &AppSettings) -> Result<(), StorageError> {
        self.set_json(&self.keys.settings, settings).await
    }

    pub async fn is_onboarding_complete(&self) -> bool {
        self.get_json(&self.keys.onboarding_complete)
            .await
            .unwrap_or(false)
    }

    pub async fn set_onboarding_complete(&self, complete: bool) -> Result<(), StorageError> {
        self.set_json(&self.keys.onboarding_complete, &complete).await
    }

    /// Strict read used by read-modify-write paths so a failed read never
    /// turns into an overwrite with empty buckets.
    pub async fn try_get_offline_data(&self) -> Result<OfflineData, StorageError> {
        Ok(self
            .try_get_json(&self.keys.offline_data)
            .await?
            .unwrap_or_default())
    }

    pub async fn get_offline_data(&self) -> OfflineData {
        self.get_json(&self.keys.offline_data)
            .await
            .unwrap_or_default()
    }

    pub async fn set_offline_data(&self, data: &OfflineData) -> Result<(), StorageError> {
        self.set_json(&self.keys.offline_data, data).await
    }

    /// Removes every key this store owns.
    pub async fn reset_all(&self) -> Result<(), StorageError> {
        self.backend.multi_remove(&self.keys.all()).await?;
        Ok(())
    }
}
