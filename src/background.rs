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

//! Fire-and-forget background transcription, triggered on every chunk
//! upload (spec.md §4.4). Grounded on the assistant's `mpsc`/`Arc<RwLock<_>>`
//! event plumbing in `meeting_recorder.rs` and the typed-channel registry
//! idiom in `continuous_types.rs`.

use crate::audio::decode_chunk;
use crate::blobstore::BlobStore;
use crate::corrections::Corrector;
use crate::repository::Repository;
use crate::transcriber::Transcriber;
use crate::types::ChunkTranscription;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct BackgroundTranscriber<B, R, T> {
    blob_store: Arc<B>,
    repository: Arc<R>,
    transcriber: Arc<T>,
    corrector: Arc<Corrector>,
}

impl<B, R, T> BackgroundTranscriber<B, R, T>
where
    B: BlobStore + 'static,
    R: Repository + 'static,
    T: Transcriber + 'static,
{
    pub fn new(blob_store: Arc<B>, repository: Arc<R>, transcriber: Arc<T>, corrector: Arc<Corrector>) -> Self {
        Self {
            blob_store,
            repository,
            transcriber,
            corrector,
        }
    }

    /// Schedule background transcription for a just-uploaded chunk. The
    /// ingest path returns as soon as this call returns — the spawned
    /// task runs independently and is allowed to fail on its own.
    pub fn on_chunk_uploaded(
        &self,
        session_id: Uuid,
        chunk_number: u32,
        blob_path: String,
        duration_seconds: f64,
    ) {
        let blob_store = self.blob_store.clone();
        let repository = self.repository.clone();
        let transcriber = self.transcriber.clone();
        let corrector = self.corrector.clone();

        tokio::spawn(async move {
            let result = Self::run(
                &*blob_store,
                &*transcriber,
                &corrector,
                session_id,
                chunk_number,
                &blob_path,
            )
            .await;

            let row = match result {
                Ok((raw_text, corrected_text, word_counts)) => ChunkTranscription {
                    session_id,
                    chunk_number,
                    raw_text: Some(raw_text),
                    corrected_text: Some(corrected_text),
                    word_counts: Some(word_counts),
                    duration_seconds,
                    transcribed_at: Some(Utc::now()),
                    error: None,
                },
                Err(message) => {
                    tracing::warn!(
                        session_id = %session_id,
                        chunk_number,
                        error = %message,
                        "background transcription failed"
                    );
                    ChunkTranscription {
                        session_id,
                        chunk_number,
                        raw_text: None,
                        corrected_text: None,
                        word_counts: None,
                        duration_seconds,
                        transcribed_at: None,
                        error: Some(message),
                    }
                }
            };

            if let Err(e) = repository.upsert_chunk_transcription(row).await {
                tracing::error!(session_id = %session_id, chunk_number, error = %e, "failed to upsert chunk transcription");
            }
        });
    }

    async fn run(
        blob_store: &B,
        transcriber: &T,
        corrector: &Corrector,
        session_id: Uuid,
        chunk_number: u32,
        blob_path: &str,
    ) -> Result<(String, String, crate::types::WordCounts), String> {
        let bytes = blob_store
            .get_bytes(blob_path)
            .await
            .map_err(|e| e.to_string())?;
        let decoded = decode_chunk(session_id, chunk_number, &bytes).map_err(|e| e.to_string())?;
        let raw_text = transcriber
            .transcribe(&decoded.samples)
            .await
            .map_err(|e| e.to_string())?;
        let (corrected_text, word_counts) = corrector.process(&raw_text);
        Ok((raw_text, corrected_text, word_counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blobstore::InMemoryBlobStore;
    use crate::config::{DEFAULT_CORRECTIONS, DEFAULT_TARGET_WORDS};
    use crate::repository::{InMemoryRepository, Repository as _};
    use crate::transcriber::FakeTranscriber;
    use std::time::Duration;

    fn corrector() -> Arc<Corrector> {
        let corrections: Vec<(String, String)> = DEFAULT_CORRECTIONS
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        let words: Vec<String> = DEFAULT_TARGET_WORDS.iter().map(|s| s.to_string()).collect();
        Arc::new(Corrector::new(&corrections, &words))
    }

    fn make_wav_bytes(samples: &[i16]) -> Vec<u8> {
        crate::audio::encode_wav(samples).unwrap()
    }

    #[tokio::test]
    async fn successful_chunk_upserts_non_error_row() {
        let blob_store = Arc::new(InMemoryBlobStore::new());
        let repo = Arc::new(InMemoryRepository::new());
        let transcriber = Arc::new(FakeTranscriber::new("shiok lah"));
        let session_id = Uuid::new_v4();

        blob_store
            .put_bytes("chunks/1.wav", make_wav_bytes(&[0i16; 1600]))
            .await
            .unwrap();

        let background = BackgroundTranscriber::new(blob_store, repo.clone(), transcriber, corrector());
        background.on_chunk_uploaded(session_id, 1, "chunks/1.wav".into(), 0.1);

        tokio::time::sleep(Duration::from_millis(100)).await;

        let rows = repo.list_chunk_transcriptions(session_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].error.is_none());
        assert_eq!(rows[0].corrected_text.as_deref(), Some("shiok lah"));
    }

    #[tokio::test]
    async fn failing_transcriber_upserts_error_row() {
        let blob_store = Arc::new(InMemoryBlobStore::new());
        let repo = Arc::new(InMemoryRepository::new());
        let transcriber = Arc::new(FakeTranscriber::failing());
        let session_id = Uuid::new_v4();

        blob_store
            .put_bytes("chunks/1.wav", make_wav_bytes(&[0i16; 1600]))
            .await
            .unwrap();

        let background = BackgroundTranscriber::new(blob_store, repo.clone(), transcriber, corrector());
        background.on_chunk_uploaded(session_id, 1, "chunks/1.wav".into(), 0.1);

        tokio::time::sleep(Duration::from_millis(100)).await;

        let rows = repo.list_chunk_transcriptions(session_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].error.is_some());
    }
}
