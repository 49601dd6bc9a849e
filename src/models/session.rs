use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::pkcs12::KeyMaterial;

/// A login session written to Redis by the authentication service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// The ID of the user this session belongs to.
    pub user_id: Uuid,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

/// Lifecycle state of an owner's certificate session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    NoSession,
    Unlocked,
    Locked,
    Ended,
}

/// In-memory certificate session. Never persisted.
///
/// `created_at` and `last_activity` are monotonic readings from the injected
/// clock; `started_at` is wall-clock and only used for display.
#[derive(Debug)]
pub struct CertificateSession {
    pub owner_id: Uuid,
    pub certificate_id: Uuid,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub created_at: Duration,
    pub last_activity: Duration,
    pub key: Option<KeyMaterial>,
}

impl CertificateSession {
    pub fn unlocked(
        owner_id: Uuid,
        certificate_id: Uuid,
        key: KeyMaterial,
        started_at: DateTime<Utc>,
        now: Duration,
    ) -> Self {
        Self {
            owner_id,
            certificate_id,
            state: SessionState::Unlocked,
            started_at,
            created_at: now,
            last_activity: now,
            key: Some(key),
        }
    }

    /// Drops the key material and moves to `LOCKED`.
    pub fn lock(&mut self) {
        self.key = None;
        self.state = SessionState::Locked;
    }

    /// Drops the key material and moves to `ENDED`.
    pub fn end(&mut self) {
        self.key = None;
        self.state = SessionState::Ended;
    }
}

/// Snapshot of an owner's certificate session, as shown to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds until an unlocked session locks itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_expires_in_secs: Option<u64>,
    /// Seconds until the session ends regardless of activity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
}

impl SessionStatus {
    pub fn none() -> Self {
        Self::bare(SessionState::NoSession)
    }

    pub fn bare(state: SessionState) -> Self {
        Self {
            state,
            certificate_id: None,
            started_at: None,
            idle_expires_in_secs: None,
            expires_in_secs: None,
        }
    }
}
