//! Retrieval of encrypted PKCS#12 containers.
//!
//! On disk every container is sealed with the master key (AES-256-GCM,
//! `ciphertext || nonce`). The unsealed bytes are still passphrase protected;
//! they are returned in a zeroizing buffer all the same.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::crypto::aes::{self, SecureKey};
use crate::error::{AppError, Result};
use crate::models::certificate::Certificate;
use crate::validation::documents::validate_container_ref;

/// Byte-addressable access to a certificate's PKCS#12 container.
#[async_trait]
pub trait KeyContainerSource: Send + Sync {
    async fn load(&self, certificate: &Certificate) -> Result<Zeroizing<Vec<u8>>>;
}

/// Reads sealed containers from a directory.
pub struct FsKeyContainerSource {
    dir: PathBuf,
    master_key: SecureKey,
}

impl FsKeyContainerSource {
    pub fn new(dir: impl Into<PathBuf>, master_key: &[u8]) -> Result<Self> {
        Ok(Self {
            dir: dir.into(),
            master_key: SecureKey::from_slice(master_key)?,
        })
    }
}

#[async_trait]
impl KeyContainerSource for FsKeyContainerSource {
    async fn load(&self, certificate: &Certificate) -> Result<Zeroizing<Vec<u8>>> {
        validate_container_ref(&certificate.container_ref)?;
        let path = self.dir.join(&certificate.container_ref);

        let sealed = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::error!(
                    "❌ Key container {} for certificate {} is missing",
                    certificate.container_ref,
                    certificate.id
                );
                return Err(AppError::Internal("Key container is missing".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Zeroizing::new(aes::open(&self.master_key, &sealed)?))
    }
}

/// Containers held in memory, keyed by `container_ref`.
#[derive(Default)]
pub struct MemoryKeyContainerSource {
    containers: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyContainerSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, container_ref: impl Into<String>, container: Vec<u8>) {
        self.containers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(container_ref.into(), container);
    }
}

#[async_trait]
impl KeyContainerSource for MemoryKeyContainerSource {
    async fn load(&self, certificate: &Certificate) -> Result<Zeroizing<Vec<u8>>> {
        self.containers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&certificate.container_ref)
            .map(|bytes| Zeroizing::new(bytes.clone()))
            .ok_or_else(|| AppError::Internal("Key container is missing".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::certificate_for;
    use uuid::Uuid;

    const MASTER_KEY: [u8; 32] = [9u8; 32];

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("medsign-keys-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn sealed_container_round_trips_through_disk() {
        let dir = scratch_dir();
        let certificate = certificate_for(Uuid::new_v4());
        let key = SecureKey::from_slice(&MASTER_KEY).unwrap();
        std::fs::write(
            dir.join(&certificate.container_ref),
            aes::seal(&key, b"p12 bytes").unwrap(),
        )
        .unwrap();

        let source = FsKeyContainerSource::new(&dir, &MASTER_KEY).unwrap();
        let container = source.load(&certificate).await.unwrap();
        assert_eq!(container.as_slice(), b"p12 bytes");

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn traversal_and_missing_files_are_refused() {
        let dir = scratch_dir();
        let source = FsKeyContainerSource::new(&dir, &MASTER_KEY).unwrap();

        let mut certificate = certificate_for(Uuid::new_v4());
        assert!(matches!(
            source.load(&certificate).await,
            Err(AppError::Internal(_))
        ));

        certificate.container_ref = "../../etc/shadow".to_string();
        assert!(matches!(
            source.load(&certificate).await,
            Err(AppError::Internal(_))
        ));

        std::fs::remove_dir_all(dir).ok();
    }
}
