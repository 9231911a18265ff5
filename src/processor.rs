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

//! Session orchestration (spec.md §4.5): assemble, diarize, cache-first/
//! live-fallback transcription, per-speaker aggregation, sample extraction,
//! persistence. Grounded on the assistant's `MeetingRecorder` struct shape
//! (config held by value, `Arc<RwLock<_>>` run state,
//! `tokio_util::sync::CancellationToken` for external cancellation) and on
//! `continuous_main.rs`'s staged-pipeline style.

use crate::audio::{assemble, decode_chunk, AssembledAudio};
use crate::blobstore::BlobStore;
use crate::cache::{classify_segment, SegmentCacheStatus, TranscriptionCache};
use crate::config::Config;
use crate::corrections::Corrector;
use crate::diarizer::Diarizer;
use crate::error::PipelineError;
use crate::progress::ProgressReporter;
use crate::repository::Repository;
use crate::sample_extractor::extract_and_store;
use crate::transcriber::Transcriber;
use crate::types::{SessionStatus, SpeakerResult, SpeakerSegment, WordCounts};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One diarized segment's transcription outcome, folded into per-speaker
/// aggregation. Never escapes as a [`PipelineError`] (spec.md §7).
struct SegmentOutcome {
    segment: SpeakerSegment,
    word_counts: WordCounts,
}

pub struct Processor<B, R, D, T> {
    blob_store: Arc<B>,
    repository: Arc<R>,
    diarizer: Arc<D>,
    transcriber: Arc<T>,
    corrector: Arc<Corrector>,
    config: Config,
}

impl<B, R, D, T> Processor<B, R, D, T>
where
    B: BlobStore,
    R: Repository,
    D: Diarizer,
    T: Transcriber,
{
    pub fn new(
        blob_store: Arc<B>,
        repository: Arc<R>,
        diarizer: Arc<D>,
        transcriber: Arc<T>,
        config: Config,
    ) -> Self {
        let corrector = Arc::new(Corrector::new(&config.corrections, &config.target_words));
        Self {
            blob_store,
            repository,
            diarizer,
            transcriber,
            corrector,
            config,
        }
    }

    /// Run the full pipeline for `session_id`. On any unrecoverable error
    /// the session is pushed to `failed` with the error message and the
    /// same error is returned to the caller; cleanup (no leftover partial
    /// results) always runs.
    pub async fn run(
        &self,
        session_id: Uuid,
        cancellation: CancellationToken,
    ) -> Result<(), PipelineError> {
        let reporter = ProgressReporter::new(&*self.repository, session_id);
        match self.run_inner(session_id, &reporter, &cancellation).await {
            Ok(()) => Ok(()),
            Err(err) => {
                reporter.fail(err.to_string()).await.ok();
                Err(err)
            }
        }
    }

    async fn run_inner(
        &self,
        session_id: Uuid,
        reporter: &ProgressReporter<'_, R>,
        cancellation: &CancellationToken,
    ) -> Result<(), PipelineError> {
        // --- 1. Assemble (weight 10) --------------------------------------
        let assembled = self.assemble_session(session_id).await?;
        reporter.report(SessionStatus::Processing, 10).await?;

        // --- 2. Diarize (weight 30) ----------------------------------------
        let segments = self
            .diarizer
            .diarize(&assembled.samples, self.config.overlap_tolerance_seconds)
            .await
            .map_err(|e| PipelineError::Diarization(e.to_string()))?;
        reporter.report(SessionStatus::Processing, 40).await?;

        // --- 3. Transcribe & count (weight 40) ------------------------------
        let cache_rows = self.repository.list_chunk_transcriptions(session_id).await?;
        let cache = TranscriptionCache::from_rows(cache_rows);

        let mut cached_segments = Vec::new();
        let mut uncached_segments = Vec::new();
        for segment in segments {
            match classify_segment(
                &segment,
                &assembled,
                &cache,
                self.config.segment_cache_coverage_threshold,
            ) {
                SegmentCacheStatus::Hit { corrected_text } => {
                    cached_segments.push((segment, corrected_text));
                }
                SegmentCacheStatus::Miss { reason } => {
                    tracing::debug!(session_id = %session_id, speaker = %segment.speaker_label, reason = %reason, "segment cache miss");
                    uncached_segments.push(segment);
                }
            }
        }

        let total_segments = cached_segments.len() + uncached_segments.len();
        let completed = Arc::new(AtomicUsize::new(0));

        let mut outcomes = Vec::with_capacity(total_segments);
        for (segment, corrected_text) in cached_segments {
            let word_counts = if self.config.exclude_overlap_from_counts && segment.overlap_flag {
                WordCounts::new()
            } else {
                self.corrector.count_target_words(&corrected_text)
            };
            outcomes.push(SegmentOutcome { segment, word_counts });
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            reporter
                .report(SessionStatus::Processing, segment_progress(done, total_segments))
                .await?;
        }

        let live_outcomes = self
            .transcribe_uncached(
                session_id,
                &assembled,
                uncached_segments,
                cancellation,
                reporter,
                &completed,
                total_segments,
            )
            .await?;
        outcomes.extend(live_outcomes);

        reporter.report(SessionStatus::Processing, 80).await?;

        // --- 4. Aggregate per speaker ----------------------------------------
        let mut per_speaker: HashMap<String, SpeakerResult> = HashMap::new();
        let mut segments_by_speaker: HashMap<String, Vec<SpeakerSegment>> = HashMap::new();
        for outcome in outcomes {
            let entry = per_speaker
                .entry(outcome.segment.speaker_label.clone())
                .or_insert_with(|| SpeakerResult {
                    session_id,
                    speaker_label: outcome.segment.speaker_label.clone(),
                    segment_count: 0,
                    total_duration: 0.0,
                    sample_blob_path: String::new(),
                    sample_start_time: 0.0,
                    word_counts: WordCounts::new(),
                });
            entry.segment_count += 1;
            entry.total_duration += outcome.segment.duration();
            for (word, count) in outcome.word_counts {
                *entry.word_counts.entry(word).or_insert(0) += count;
            }
            segments_by_speaker
                .entry(outcome.segment.speaker_label.clone())
                .or_default()
                .push(outcome.segment);
        }

        // --- 4. Sample extraction (weight 10) ---------------------------------
        for (speaker_label, result) in per_speaker.iter_mut() {
            let segments = &segments_by_speaker[speaker_label];
            let refs: Vec<&SpeakerSegment> = segments.iter().collect();
            let (path, start) = extract_and_store(
                &*self.blob_store,
                session_id,
                speaker_label,
                &assembled,
                &refs,
                self.config.sample_length_seconds,
            )
            .await?;
            result.sample_blob_path = path;
            result.sample_start_time = start;
        }
        reporter.report(SessionStatus::Processing, 90).await?;

        // --- 5. Persist (weight 10) --------------------------------------------
        let results: Vec<SpeakerResult> = per_speaker.into_values().collect();
        self.repository.save_speaker_results(session_id, results).await?;
        reporter.complete().await?;

        Ok(())
    }

    async fn assemble_session(&self, session_id: Uuid) -> Result<AssembledAudio, PipelineError> {
        let chunks = self.repository.list_chunks(session_id).await?;
        if chunks.is_empty() {
            return Err(PipelineError::IncompleteSession(session_id));
        }
        for (expected, chunk) in (1..).zip(chunks.iter()) {
            if chunk.chunk_number != expected {
                return Err(PipelineError::IncompleteSession(session_id));
            }
        }

        let mut decoded = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let bytes = self.blob_store.get_bytes(&chunk.blob_path).await?;
            decoded.push(decode_chunk(session_id, chunk.chunk_number, &bytes)?);
        }
        Ok(assemble(decoded))
    }

    /// Live-fallback transcription for segments the cache missed, bounded
    /// to `MAX_PARALLEL_LIVE_TRANSCRIPTIONS` concurrent Transcriber calls
    /// (spec.md §4.5/§5). Per-segment failures and timeouts never escape —
    /// they contribute empty word counts and the pipeline continues.
    #[allow(clippy::too_many_arguments)]
    async fn transcribe_uncached(
        &self,
        session_id: Uuid,
        assembled: &AssembledAudio,
        segments: Vec<SpeakerSegment>,
        cancellation: &CancellationToken,
        reporter: &ProgressReporter<'_, R>,
        completed: &Arc<AtomicUsize>,
        total_segments: usize,
    ) -> Result<Vec<SegmentOutcome>, PipelineError> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_live_transcriptions));
        let timeout = std::time::Duration::from_secs(self.config.segment_timeout_seconds);
        let exclude_overlap = self.config.exclude_overlap_from_counts;

        let tasks = segments.into_iter().map(|segment| {
            let semaphore = semaphore.clone();
            let transcriber = self.transcriber.clone();
            let corrector = self.corrector.clone();
            let samples = assembled.slice(segment.start_time, segment.end_time);
            let cancellation = cancellation.clone();
            let completed = completed.clone();

            async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.expect("semaphore not closed"),
                    _ = cancellation.cancelled() => {
                        tracing::debug!(session_id = %session_id, speaker = %segment.speaker_label, "live transcription cancelled before dispatch");
                        return report_segment_done(reporter, &completed, total_segments, SegmentOutcome { word_counts: WordCounts::new(), segment }).await;
                    }
                };

                let transcribed = tokio::select! {
                    result = tokio::time::timeout(timeout, transcriber.transcribe(&samples)) => result,
                    _ = cancellation.cancelled() => {
                        tracing::debug!(session_id = %session_id, speaker = %segment.speaker_label, "live transcription cancelled in flight");
                        return report_segment_done(reporter, &completed, total_segments, SegmentOutcome { word_counts: WordCounts::new(), segment }).await;
                    }
                };

                let word_counts = match transcribed {
                    Ok(Ok(raw_text)) => {
                        let (corrected_text, counts) = corrector.process(&raw_text);
                        if exclude_overlap && segment.overlap_flag {
                            WordCounts::new()
                        } else {
                            let _ = &corrected_text;
                            counts
                        }
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(session_id = %session_id, speaker = %segment.speaker_label, error = %e, "live transcription failed");
                        WordCounts::new()
                    }
                    Err(_) => {
                        tracing::warn!(session_id = %session_id, speaker = %segment.speaker_label, "live transcription timed out");
                        WordCounts::new()
                    }
                };

                report_segment_done(reporter, &completed, total_segments, SegmentOutcome { segment, word_counts }).await
            }
        });

        Ok(futures::future::join_all(tasks).await)
    }
}

/// Stage-3 progress scaled to `[40, 80]` by fraction of segments completed
/// (spec.md §4.7: progress ticks smoothly, not in one jump at the end).
fn segment_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 80;
    }
    (40 + done * 40 / total).min(80) as u8
}

async fn report_segment_done<R: Repository>(
    reporter: &ProgressReporter<'_, R>,
    completed: &AtomicUsize,
    total_segments: usize,
    outcome: SegmentOutcome,
) -> SegmentOutcome {
    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
    if let Err(e) = reporter
        .report(SessionStatus::Processing, segment_progress(done, total_segments))
        .await
    {
        tracing::warn!(error = %e, "failed to report live-transcription progress");
    }
    outcome
}
