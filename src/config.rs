use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

/// Minimum length of the share-token HMAC secret, in bytes.
const MIN_SHARE_SECRET_BYTES: usize = 32;

/// Shortest verification hash fragment that may be configured.
pub const MIN_HASH_FRAGMENT_FLOOR: usize = 16;

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// Maximum number of pooled PostgreSQL connections.
    pub database_pool_size: usize,
    /// The URL of the Redis server.
    pub redis_url: String,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Origins allowed by the CORS layer.
    pub cors_allowed_origins: Vec<String>,
    /// The master key that seals PKCS#12 containers at rest.
    pub master_key: Zeroizing<Vec<u8>>,
    /// The HMAC secret used to sign share tokens.
    pub share_token_secret: Zeroizing<Vec<u8>>,
    /// The previous HMAC secret, still accepted while a rotation is in progress.
    pub share_token_previous_secret: Option<Zeroizing<Vec<u8>>>,
    /// Default validity of a share link, in days.
    pub share_token_default_days: u32,
    /// Upper bound for share link validity, in days.
    pub share_token_max_days: u32,
    /// How long an unlocked certificate session may stay idle.
    pub session_idle_timeout: Duration,
    /// Maximum lifetime of a certificate session.
    pub session_absolute_timeout: Duration,
    /// Timeout applied around PKCS#12 decoding.
    pub key_decode_timeout: Duration,
    /// Maximum number of PKCS#12 decodes running at once.
    pub max_concurrent_key_decodes: usize,
    /// Directory holding sealed key containers.
    pub key_container_dir: PathBuf,
    /// Directory holding rendered document artifacts.
    pub artifact_dir: PathBuf,
    /// Minimum number of hex characters accepted as a verification hash fragment.
    pub min_hash_fragment_len: usize,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let master_key = load_master_key()?;

        let share_token_secret = hex_secret("SHARE_TOKEN_SECRET")?
            .context("SHARE_TOKEN_SECRET must be set (generate with: openssl rand -hex 32)")?;
        let share_token_previous_secret = hex_secret("SHARE_TOKEN_PREVIOUS_SECRET")?;

        let session_idle_timeout =
            Duration::from_secs(parse_var("SESSION_IDLE_TIMEOUT_SECS", 300)?);
        let session_absolute_timeout =
            Duration::from_secs(parse_var("SESSION_ABSOLUTE_TIMEOUT_SECS", 1800)?);

        if session_idle_timeout >= session_absolute_timeout {
            anyhow::bail!(
                "SESSION_IDLE_TIMEOUT_SECS must be shorter than SESSION_ABSOLUTE_TIMEOUT_SECS"
            );
        }

        let share_token_default_days: u32 = parse_var("SHARE_TOKEN_DEFAULT_DAYS", 7)?;
        let share_token_max_days: u32 = parse_var("SHARE_TOKEN_MAX_DAYS", 30)?;

        if share_token_default_days == 0 || share_token_default_days > share_token_max_days {
            anyhow::bail!("SHARE_TOKEN_DEFAULT_DAYS must be between 1 and SHARE_TOKEN_MAX_DAYS");
        }

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_pool_size: parse_var("DATABASE_POOL_SIZE", 32)?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            bind_addr: parse_var("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            cors_allowed_origins,
            master_key,
            share_token_secret,
            share_token_previous_secret,
            share_token_default_days,
            share_token_max_days,
            session_idle_timeout,
            session_absolute_timeout,
            key_decode_timeout: Duration::from_secs(parse_var("KEY_DECODE_TIMEOUT_SECS", 10)?),
            max_concurrent_key_decodes: parse_var("MAX_CONCURRENT_KEY_DECODES", 8)?,
            key_container_dir: PathBuf::from(
                env::var("KEY_CONTAINER_DIR").unwrap_or_else(|_| "keys".to_string()),
            ),
            artifact_dir: PathBuf::from(
                env::var("ARTIFACT_DIR").unwrap_or_else(|_| "artifacts".to_string()),
            ),
            min_hash_fragment_len: min_hash_fragment_len(parse_var(
                "MIN_HASH_FRAGMENT_LEN",
                MIN_HASH_FRAGMENT_FLOOR,
            )?)?,
        })
    }
}

/// Reads and validates `MASTER_KEY` (32 bytes, hex encoded).
pub fn load_master_key() -> Result<Zeroizing<Vec<u8>>> {
    let master_key = hex_secret("MASTER_KEY")?
        .context("MASTER_KEY must be set (generate with: openssl rand -hex 32)")?;

    if master_key.len() != 32 {
        anyhow::bail!("MASTER_KEY must be exactly 32 bytes (64 hex characters)");
    }

    Ok(master_key)
}

/// Decodes an optional hex-encoded secret, zeroizing the source string.
fn hex_secret(name: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
    let Ok(mut encoded) = env::var(name) else {
        return Ok(None);
    };

    let decoded = hex::decode(encoded.trim());
    encoded.zeroize();

    let bytes = Zeroizing::new(
        decoded.with_context(|| format!("{} must be valid hexadecimal", name))?,
    );

    if name.starts_with("SHARE_TOKEN") && bytes.len() < MIN_SHARE_SECRET_BYTES {
        anyhow::bail!("{} must be at least {} bytes", name, MIN_SHARE_SECRET_BYTES);
    }

    Ok(Some(bytes))
}

fn min_hash_fragment_len(len: usize) -> Result<usize> {
    if len < MIN_HASH_FRAGMENT_FLOOR {
        anyhow::bail!(
            "MIN_HASH_FRAGMENT_LEN must be at least {}",
            MIN_HASH_FRAGMENT_FLOOR
        );
    }
    Ok(len)
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}
