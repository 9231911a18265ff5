/*
 * Meeting Assistant CLI - Rust Edition
 * Copyright (c) 2024 Meeting Assistant Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 *
 * For commercial licensing inquiries, please contact the project maintainers.
 */

//! Content-addressed byte storage behind opaque paths, per spec.md §6.

use crate::error::PipelineError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, PipelineError>;
    async fn put_bytes(&self, path: &str, bytes: Vec<u8>) -> Result<String, PipelineError>;
    fn public_url(&self, path: &str) -> String;
}

/// Filesystem-backed `BlobStore`, rooted at a configured directory the
/// same way the assistant roots its scratch files under `Config::temp_dir`.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, PipelineError> {
        tokio::fs::read(self.resolve(path))
            .await
            .map_err(|e| PipelineError::Storage(format!("read {path}: {e}")))
    }

    async fn put_bytes(&self, path: &str, bytes: Vec<u8>) -> Result<String, PipelineError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::Storage(format!("mkdir for {path}: {e}")))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| PipelineError::Storage(format!("write {path}: {e}")))?;
        Ok(path.to_string())
    }

    fn public_url(&self, path: &str) -> String {
        format!("file://{}", self.resolve(path).display())
    }
}

/// In-memory test double.
#[derive(Default, Clone)]
pub struct InMemoryBlobStore {
    store: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, PipelineError> {
        self.store
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| PipelineError::Storage(format!("no such blob: {path}")))
    }

    async fn put_bytes(&self, path: &str, bytes: Vec<u8>) -> Result<String, PipelineError> {
        self.store.write().await.insert(path.to_string(), bytes);
        Ok(path.to_string())
    }

    fn public_url(&self, path: &str) -> String {
        format!("mem://{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryBlobStore::new();
        store.put_bytes("a/b.wav", vec![1, 2, 3]).await.unwrap();
        let bytes = store.get_bytes("a/b.wav").await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_blob_is_an_error() {
        let store = InMemoryBlobStore::new();
        assert!(store.get_bytes("missing").await.is_err());
    }
}
