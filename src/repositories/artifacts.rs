//! Rendered document artifacts served through share links.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::validation::documents::validate_document_id;

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// The rendered artifact for `document_id`, if one exists.
    async fn fetch(&self, document_id: &str) -> Result<Option<Vec<u8>>>;
}

/// Reads `<dir>/<document_id>.pdf`.
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn fetch(&self, document_id: &str) -> Result<Option<Vec<u8>>> {
        validate_document_id(document_id)?;
        let path = self.dir.join(format!("{}.pdf", document_id));

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, document_id: impl Into<String>, bytes: Vec<u8>) {
        self.artifacts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(document_id.into(), bytes);
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn fetch(&self, document_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .artifacts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(document_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn reads_pdf_by_document_id() {
        let dir = std::env::temp_dir().join(format!("medsign-artifacts-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("doc-9.pdf"), b"%PDF-1.7\n").unwrap();

        let store = FsArtifactStore::new(&dir);
        assert_eq!(store.fetch("doc-9").await.unwrap().unwrap(), b"%PDF-1.7\n");
        assert!(store.fetch("doc-10").await.unwrap().is_none());
        assert!(store.fetch("../doc-9").await.is_err());

        std::fs::remove_dir_all(dir).ok();
    }
}
