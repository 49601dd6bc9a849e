//! Per-owner certificate sessions.
//!
//! Each owner gets a slot (`Arc<Mutex<Option<CertificateSession>>>`) created
//! lazily and never removed, so two callers can never race on creating the
//! lock itself. Every public operation takes the owner's lock, applies the
//! timeouts via [`ensure_live`] and only then looks at the state.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::config::Config;
use crate::crypto::pkcs12::{KeyMaterial, KeyMaterialCodec};
use crate::error::{AppError, Result};
use crate::models::certificate::Certificate;
use crate::models::session::{CertificateSession, SessionState, SessionStatus};
use crate::repositories::DocumentStore;
use crate::repositories::key_containers::KeyContainerSource;

type SessionSlot = Arc<Mutex<Option<CertificateSession>>>;

/// Timeouts and limits applied to certificate sessions.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    /// An unlocked session with no signing activity for this long locks itself.
    pub idle_timeout: Duration,
    /// A session ends this long after `start`, whatever its activity.
    pub absolute_timeout: Duration,
    /// Upper bound on a single PKCS#12 decode.
    pub key_decode_timeout: Duration,
    /// Decodes allowed to run at once across all owners.
    pub max_concurrent_decodes: usize,
}

impl SessionPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            idle_timeout: config.session_idle_timeout,
            absolute_timeout: config.session_absolute_timeout,
            key_decode_timeout: config.key_decode_timeout,
            max_concurrent_decodes: config.max_concurrent_key_decodes,
        }
    }
}

/// Applies the absolute and idle timeouts to an owner's session.
///
/// Absolute expiry leaves an `ENDED` tombstone so the next caller learns the
/// session expired rather than never existed.
fn ensure_live(slot: &mut Option<CertificateSession>, clock: &dyn Clock, policy: &SessionPolicy) {
    let Some(session) = slot.as_mut() else {
        return;
    };
    if session.state == SessionState::Ended {
        return;
    }

    let now = clock.monotonic();

    if now.saturating_sub(session.created_at) >= policy.absolute_timeout {
        session.end();
        tracing::info!(
            "⏰ Certificate session for {} reached its absolute lifetime",
            session.owner_id
        );
        return;
    }

    if session.state == SessionState::Unlocked
        && now.saturating_sub(session.last_activity) >= policy.idle_timeout
    {
        session.lock();
        tracing::info!(
            "🔒 Certificate session for {} locked after inactivity",
            session.owner_id
        );
    }
}

/// A borrowed signing capability.
///
/// Holds the owner's session lock for as long as it lives, so a concurrent
/// `lock` or `end` waits until the signature is produced. `sign` consumes the
/// handle.
pub struct SigningKeyHandle {
    guard: OwnedMutexGuard<Option<CertificateSession>>,
    certificate_id: Uuid,
}

impl SigningKeyHandle {
    pub fn certificate_id(&self) -> Uuid {
        self.certificate_id
    }

    /// Signs `payload` with the session's key and releases the lock.
    pub fn sign(self, payload: &[u8]) -> Result<Vec<u8>> {
        let key = self
            .guard
            .as_ref()
            .and_then(|session| session.key.as_ref())
            .ok_or(AppError::SessionLocked)?;
        key.sign(payload)
    }
}

/// Owns every certificate session in the process.
pub struct CertificateSessionManager {
    slots: DashMap<Uuid, SessionSlot>,
    store: Arc<dyn DocumentStore>,
    containers: Arc<dyn KeyContainerSource>,
    codec: Arc<dyn KeyMaterialCodec>,
    clock: Arc<dyn Clock>,
    decode_permits: Arc<Semaphore>,
    policy: SessionPolicy,
}

impl CertificateSessionManager {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        containers: Arc<dyn KeyContainerSource>,
        codec: Arc<dyn KeyMaterialCodec>,
        clock: Arc<dyn Clock>,
        policy: SessionPolicy,
    ) -> Self {
        let decode_permits = Arc::new(Semaphore::new(policy.max_concurrent_decodes.max(1)));
        Self {
            slots: DashMap::new(),
            store,
            containers,
            codec,
            clock,
            decode_permits,
            policy,
        }
    }

    fn slot(&self, owner_id: Uuid) -> SessionSlot {
        self.slots.entry(owner_id).or_default().clone()
    }

    fn ensure_live(&self, slot: &mut Option<CertificateSession>) {
        ensure_live(slot, self.clock.as_ref(), &self.policy);
    }

    /// Unlocks a certificate and makes it the owner's only session.
    ///
    /// With no `certificate_id` the owner's active certificate is used. Any
    /// previous session survives a failed start and is only discarded once the
    /// new key material has been decoded.
    pub async fn start(
        &self,
        owner_id: Uuid,
        certificate_id: Option<Uuid>,
        passphrase: &str,
    ) -> Result<SessionStatus> {
        let slot = self.slot(owner_id);
        let mut guard = slot.lock().await;
        self.ensure_live(&mut guard);

        let certificate = self.resolve_certificate(owner_id, certificate_id).await?;
        let key = self.unlock_key(&certificate, passphrase).await?;

        if let Some(previous) = guard.take() {
            tracing::info!(
                "🔁 Replacing certificate session for {} (was {:?})",
                owner_id,
                previous.state
            );
        }

        *guard = Some(CertificateSession::unlocked(
            owner_id,
            certificate.id,
            key,
            self.clock.now(),
            self.clock.monotonic(),
        ));

        tracing::info!(
            "✅ Certificate session started for {} with certificate {}",
            owner_id,
            certificate.id
        );

        Ok(self.snapshot(&guard))
    }

    /// Purges the key material but remembers the session.
    pub async fn lock(&self, owner_id: Uuid) -> Result<SessionStatus> {
        let slot = self.slot(owner_id);
        let mut guard = slot.lock().await;
        self.ensure_live(&mut guard);

        let session = guard.as_mut().ok_or(AppError::SessionNotFound)?;
        match session.state {
            SessionState::Unlocked => {
                session.lock();
                tracing::info!("🔒 Certificate session locked for {}", owner_id);
            }
            SessionState::Locked => {}
            SessionState::Ended | SessionState::NoSession => return Err(AppError::SessionExpired),
        }

        Ok(self.snapshot(&guard))
    }

    /// Re-derives the key of a locked session from its container.
    ///
    /// A wrong passphrase leaves the session locked. The absolute lifetime
    /// still counts from the original `start`.
    pub async fn unlock(&self, owner_id: Uuid, passphrase: &str) -> Result<SessionStatus> {
        let slot = self.slot(owner_id);
        let mut guard = slot.lock().await;
        self.ensure_live(&mut guard);

        let (state, certificate_id) = match guard.as_ref() {
            Some(session) => (session.state, session.certificate_id),
            None => return Err(AppError::SessionNotFound),
        };

        match state {
            SessionState::Unlocked => return Ok(self.snapshot(&guard)),
            SessionState::Ended | SessionState::NoSession => return Err(AppError::SessionExpired),
            SessionState::Locked => {}
        }

        let certificate = self
            .store
            .find_certificate(certificate_id)
            .await?
            .filter(|certificate| certificate.active && certificate.owner_id == owner_id)
            .ok_or(AppError::CertificateNotFound)?;
        self.check_validity(&certificate)?;

        let key = self.unlock_key(&certificate, passphrase).await?;

        if let Some(session) = guard.as_mut() {
            session.key = Some(key);
            session.state = SessionState::Unlocked;
            session.last_activity = self.clock.monotonic();
        }

        tracing::info!("🔓 Certificate session unlocked for {}", owner_id);
        Ok(self.snapshot(&guard))
    }

    /// Purges key material and metadata.
    pub async fn end(&self, owner_id: Uuid) -> Result<()> {
        let slot = self.slot(owner_id);
        let mut guard = slot.lock().await;
        self.ensure_live(&mut guard);

        match guard.take() {
            Some(session) if session.state != SessionState::Ended => {
                tracing::info!("👋 Certificate session ended for {}", owner_id);
                Ok(())
            }
            _ => Err(AppError::SessionNotFound),
        }
    }

    pub async fn status(&self, owner_id: Uuid) -> SessionStatus {
        let slot = self.slot(owner_id);
        let mut guard = slot.lock().await;
        self.ensure_live(&mut guard);
        self.snapshot(&guard)
    }

    /// Lends the owner's key for exactly one signing operation.
    ///
    /// The returned handle keeps the owner's lock; drop or consume it before
    /// doing anything slow.
    pub async fn borrow_signing_key(&self, owner_id: Uuid) -> Result<SigningKeyHandle> {
        let slot = self.slot(owner_id);
        let mut guard = slot.lock_owned().await;
        self.ensure_live(&mut guard);

        let now = self.clock.monotonic();
        let session = guard.as_mut().ok_or(AppError::SessionNotFound)?;
        match session.state {
            SessionState::Unlocked => {}
            SessionState::Locked => return Err(AppError::SessionLocked),
            SessionState::Ended | SessionState::NoSession => return Err(AppError::SessionExpired),
        }

        session.last_activity = now;
        let certificate_id = session.certificate_id;

        Ok(SigningKeyHandle {
            guard,
            certificate_id,
        })
    }

    /// Applies timeouts to every idle owner and drops expired tombstones.
    ///
    /// Owners whose lock is currently held are skipped; they are checked on
    /// their next access anyway. Returns how many sessions changed state.
    pub fn sweep(&self) -> usize {
        let slots: Vec<SessionSlot> = self
            .slots
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut changed = 0;
        for slot in slots {
            let Ok(mut guard) = slot.try_lock() else {
                continue;
            };

            let before = guard.as_ref().map(|session| session.state);
            self.ensure_live(&mut guard);
            let after = guard.as_ref().map(|session| session.state);

            if after == Some(SessionState::Ended) {
                *guard = None;
            }
            if before != after {
                changed += 1;
            }
        }

        if changed > 0 {
            tracing::debug!("🧹 Session sweep changed {} sessions", changed);
        }
        changed
    }

    async fn resolve_certificate(
        &self,
        owner_id: Uuid,
        certificate_id: Option<Uuid>,
    ) -> Result<Certificate> {
        let certificate = match certificate_id {
            Some(id) => self
                .store
                .find_certificate(id)
                .await?
                .filter(|certificate| certificate.active && certificate.owner_id == owner_id),
            None => self.store.find_active_certificate(owner_id).await?,
        }
        .ok_or(AppError::CertificateNotFound)?;

        self.check_validity(&certificate)?;
        Ok(certificate)
    }

    fn check_validity(&self, certificate: &Certificate) -> Result<()> {
        if !certificate.is_valid_at(self.clock.now()) {
            tracing::warn!(
                "❌ Certificate {} is outside its validity window",
                certificate.id
            );
            return Err(AppError::CertificateExpired);
        }
        Ok(())
    }

    /// Loads and decodes a certificate's container, checking it belongs to
    /// the enrolled certificate.
    async fn unlock_key(&self, certificate: &Certificate, passphrase: &str) -> Result<KeyMaterial> {
        let container = self.containers.load(certificate).await?;
        let key = self.decode(container, passphrase).await?;

        if key.certificate().public_key != certificate.public_key {
            tracing::error!(
                "❌ Key container for certificate {} holds a different key pair",
                certificate.id
            );
            return Err(AppError::Crypto(
                "Key container does not match the enrolled certificate".to_string(),
            ));
        }

        let now = self.clock.now();
        if now < key.certificate().not_before || now > key.certificate().not_after {
            return Err(AppError::CertificateExpired);
        }

        Ok(key)
    }

    /// Runs the codec on the blocking pool under the decode semaphore and
    /// timeout. A timed-out decode keeps its permit until it finishes.
    async fn decode(&self, container: Zeroizing<Vec<u8>>, passphrase: &str) -> Result<KeyMaterial> {
        let permit = Arc::clone(&self.decode_permits)
            .acquire_owned()
            .await
            .map_err(|_| AppError::Internal("Key decoder is shut down".to_string()))?;

        let codec = Arc::clone(&self.codec);
        let passphrase = Zeroizing::new(passphrase.to_owned());
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            codec.decode(&container, &passphrase)
        });

        match tokio::time::timeout(self.policy.key_decode_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(AppError::Internal(format!("Key decode task failed: {}", e))),
            Err(_) => {
                tracing::warn!(
                    "⏱️ Key container decode exceeded {:?}",
                    self.policy.key_decode_timeout
                );
                Err(AppError::KeyDecodeTimeout)
            }
        }
    }

    fn snapshot(&self, slot: &Option<CertificateSession>) -> SessionStatus {
        let Some(session) = slot else {
            return SessionStatus::none();
        };
        if session.state == SessionState::Ended {
            return SessionStatus::bare(SessionState::Ended);
        }

        let now = self.clock.monotonic();
        let remaining = |deadline: Duration, since: Duration| {
            deadline.saturating_sub(now.saturating_sub(since)).as_secs()
        };

        SessionStatus {
            state: session.state,
            certificate_id: Some(session.certificate_id),
            started_at: Some(session.started_at),
            idle_expires_in_secs: (session.state == SessionState::Unlocked)
                .then(|| remaining(self.policy.idle_timeout, session.last_activity)),
            expires_in_secs: Some(remaining(self.policy.absolute_timeout, session.created_at)),
        }
    }
}
