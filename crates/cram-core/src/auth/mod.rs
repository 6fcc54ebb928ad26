//! Authenticated session consumed by the sync engine.
//!
//! Signing in happens elsewhere; this module only stores the resulting
//! session and hands the current one to sync cycles.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::UserId;

const EXPIRY_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry as Unix seconds
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }

    /// The session's user as a sync owner, `None` when the id is blank
    pub fn user_id(&self) -> Option<UserId> {
        UserId::new(self.user.id.clone())
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid session: {0}")]
    InvalidSession(&'static str),
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
    #[error("Failed to parse session JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Source of the current authenticated session.
#[allow(async_fn_in_trait)]
pub trait SessionProvider {
    /// The usable session, or `None` when signed out or expired
    async fn current_session(&self) -> Option<AuthSession>;
}

/// Backend that keeps the serialized session somewhere durable.
pub trait SessionPersistence {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// Session held by a [`SessionPersistence`] backend.
///
/// Saving validates the session first. As a [`SessionProvider`] it hides
/// expired and unreadable sessions.
#[derive(Debug, Clone, Default)]
pub struct StoredSession<P> {
    store: P,
}

impl<P: SessionPersistence> StoredSession<P> {
    pub const fn new(store: P) -> Self {
        Self { store }
    }

    /// Read the stored session, expired or not
    pub fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        self.store.load_session()
    }

    pub fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        if session.access_token.trim().is_empty() {
            return Err(AuthError::InvalidSession("access token must not be empty"));
        }
        if session.user_id().is_none() {
            return Err(AuthError::InvalidSession("user id must not be empty"));
        }
        self.store.save_session(session)
    }

    pub fn clear_session(&self) -> AuthResult<()> {
        self.store.clear_session()
    }
}

impl<P: SessionPersistence> SessionProvider for StoredSession<P> {
    async fn current_session(&self) -> Option<AuthSession> {
        match self.store.load_session() {
            Ok(Some(session)) if !session.is_expired() => Some(session),
            Ok(Some(_)) => {
                tracing::debug!("Stored session has expired");
                None
            }
            Ok(None) => None,
            Err(error) => {
                tracing::warn!("Failed to load stored session: {}", error);
                None
            }
        }
    }
}

/// Process-local persistence; clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    raw: Arc<Mutex<Option<String>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whatever text a real backend could hand back, valid or not
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Arc::new(Mutex::new(Some(raw.into()))),
        }
    }

    fn slot(&self) -> AuthResult<MutexGuard<'_, Option<String>>> {
        self.raw
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }
}

impl SessionPersistence for MemorySessionStore {
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        match self.slot()?.as_deref() {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        *self.slot()? = Some(raw);
        Ok(())
    }

    fn clear_session(&self) -> AuthResult<()> {
        *self.slot()? = None;
        Ok(())
    }
}

/// Fixed session, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticSession(Option<AuthSession>);

impl StaticSession {
    pub const fn new(session: Option<AuthSession>) -> Self {
        Self(session)
    }

    pub const fn signed_out() -> Self {
        Self(None)
    }

    /// Long-lived session for `user_id` with a placeholder token
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self(Some(AuthSession {
            access_token: "static-token".to_string(),
            refresh_token: None,
            expires_at: i64::MAX / 2,
            user: AuthUser {
                id: user_id.into(),
                email: None,
            },
        }))
    }
}

impl SessionProvider for StaticSession {
    async fn current_session(&self) -> Option<AuthSession> {
        self.0.clone()
    }
}

pub fn unix_timestamp_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| {
            i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
        })
}
