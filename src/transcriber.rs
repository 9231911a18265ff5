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

//! Transcription capability (spec.md §4.3). `OpenAiWhisperTranscriber`
//! reuses the assistant's existing `ai.rs::transcribe_audio` shape
//! (multipart POST of a WAV file to the Whisper endpoint) behind the
//! `Transcriber` trait, with warm-up guarded by a `ModelHandle`.

use crate::audio::encode_wav;
use crate::model_handle::ModelHandle;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TranscriberError {
    #[error("transcriber model unavailable: {0}")]
    Auth(String),
    #[error("transcription failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn warm_up(&self) -> Result<(), TranscriberError>;

    /// `(samples_16khz_mono) -> raw_text`. Pure from the caller's
    /// perspective beyond the I/O of the call itself.
    async fn transcribe(&self, samples: &[i16]) -> Result<String, TranscriberError>;
}

pub struct OpenAiWhisperTranscriber {
    client: Client,
    api_key: String,
    model: ModelHandle<()>,
}

impl OpenAiWhisperTranscriber {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: ModelHandle::new(),
        }
    }
}

#[async_trait]
impl Transcriber for OpenAiWhisperTranscriber {
    async fn warm_up(&self) -> Result<(), TranscriberError> {
        if self.api_key.is_empty() {
            return Err(TranscriberError::Auth("missing transcriber model token".into()));
        }
        self.model
            .get_or_init(|| async { Ok::<(), TranscriberError>(()) })
            .await?;
        Ok(())
    }

    async fn transcribe(&self, samples: &[i16]) -> Result<String, TranscriberError> {
        self.warm_up().await?;

        let wav_bytes =
            encode_wav(samples).map_err(|e| TranscriberError::Failed(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav_bytes)
                    .file_name("segment.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| TranscriberError::Failed(e.to_string()))?,
            )
            .text("model", "whisper-1")
            .text("response_format", "text");

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/transcriptions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriberError::Failed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TranscriberError::Failed(format!(
                "whisper API error: {error_text}"
            )));
        }

        let transcript = response
            .text()
            .await
            .map_err(|e| TranscriberError::Failed(e.to_string()))?;
        Ok(transcript.trim().to_string())
    }
}

/// Deterministic test double, also used to assert the
/// `MAX_PARALLEL_LIVE_TRANSCRIPTIONS` bound (spec.md §8) via
/// `in_flight`/`high_water_mark`.
#[derive(Clone)]
pub struct FakeTranscriber {
    pub response: String,
    pub should_fail: bool,
    in_flight: Arc<AtomicUsize>,
    high_water_mark: Arc<AtomicUsize>,
}

impl FakeTranscriber {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            should_fail: false,
            in_flight: Arc::new(AtomicUsize::new(0)),
            high_water_mark: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new(String::new())
        }
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn warm_up(&self) -> Result<(), TranscriberError> {
        Ok(())
    }

    async fn transcribe(&self, _samples: &[i16]) -> Result<String, TranscriberError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water_mark.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.should_fail {
            Err(TranscriberError::Failed("simulated failure".into()))
        } else {
            Ok(self.response.clone())
        }
    }
}

/// A transcriber that panics if invoked — used to assert cache hits never
/// reach the Transcriber (spec.md §8).
pub struct PanicTranscriber;

#[async_trait]
impl Transcriber for PanicTranscriber {
    async fn warm_up(&self) -> Result<(), TranscriberError> {
        Ok(())
    }

    async fn transcribe(&self, _samples: &[i16]) -> Result<String, TranscriberError> {
        panic!("Transcriber invoked for a segment that should have been a cache hit");
    }
}
