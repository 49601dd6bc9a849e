use std::sync::Arc;

use redis::aio::ConnectionManager;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::crypto::pkcs12::Pkcs12Codec;
use crate::error::Result;
use crate::repositories::artifacts::{ArtifactStore, FsArtifactStore};
use crate::repositories::key_containers::FsKeyContainerSource;
use crate::repositories::{DocumentStore, PgDocumentStore};
use crate::services::sessions::{CertificateSessionManager, SessionPolicy};
use crate::services::share_tokens::ShareTokenService;
use crate::services::signing::DocumentSigningService;
use crate::services::verification::VerificationService;

/// Everything a share-link request needs.
#[derive(Clone)]
pub struct ShareLinks {
    pub tokens: Arc<ShareTokenService>,
    pub artifacts: Arc<dyn ArtifactStore>,
}

/// State of the unauthenticated routes. Has no Redis or session access.
#[derive(Clone)]
pub struct PublicState {
    pub verifier: Arc<VerificationService>,
    pub share: ShareLinks,
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The Redis connection manager (auth sessions, CSRF tokens, rate limits).
    pub redis: ConnectionManager,
    /// The application's configuration.
    pub config: Arc<Config>,
    /// The document store.
    pub store: Arc<dyn DocumentStore>,
    /// Per-owner certificate sessions.
    pub sessions: Arc<CertificateSessionManager>,
    /// Signing service.
    pub signing: Arc<DocumentSigningService>,
    /// Verification and share-link services.
    pub public: PublicState,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = crate::db::create_pool(&config.database_url, config.database_pool_size)?;
        let store: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(pool));
        tracing::info!("✅ PostgreSQL pool initialized (max {} connections)", config.database_pool_size);

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

        let containers = Arc::new(FsKeyContainerSource::new(
            &config.key_container_dir,
            &config.master_key,
        )?);
        let sessions = Arc::new(CertificateSessionManager::new(
            store.clone(),
            containers,
            Arc::new(Pkcs12Codec),
            clock.clone(),
            SessionPolicy::from_config(config),
        ));
        tracing::info!(
            "✅ Certificate sessions ready (idle {:?}, absolute {:?})",
            config.session_idle_timeout,
            config.session_absolute_timeout
        );

        let signing = Arc::new(DocumentSigningService::new(
            sessions.clone(),
            store.clone(),
            clock.clone(),
        ));

        let public = PublicState {
            verifier: Arc::new(VerificationService::new(
                store.clone(),
                config.min_hash_fragment_len,
            )),
            share: ShareLinks {
                tokens: Arc::new(ShareTokenService::from_config(config, clock)),
                artifacts: Arc::new(FsArtifactStore::new(&config.artifact_dir)),
            },
        };

        Ok(AppState {
            redis,
            config: Arc::new(config.clone()),
            store,
            sessions,
            signing,
            public,
        })
    }
}
