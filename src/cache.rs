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

//! Segment -> chunk cache-coverage mapping (spec.md §4.4). The cache
//! itself lives in the `Repository` (upsert semantics enforce the
//! one-row-per-key invariant); this module is the pure decision logic the
//! `Processor` uses to classify a diarized segment as a cache hit or miss.

use crate::audio::AssembledAudio;
use crate::types::{ChunkTranscription, SpeakerSegment};
use std::collections::HashMap;

pub struct TranscriptionCache {
    rows: HashMap<u32, ChunkTranscription>,
}

impl TranscriptionCache {
    pub fn from_rows(rows: Vec<ChunkTranscription>) -> Self {
        Self {
            rows: rows.into_iter().map(|r| (r.chunk_number, r)).collect(),
        }
    }

    pub fn get(&self, chunk_number: u32) -> Option<&ChunkTranscription> {
        self.rows.get(&chunk_number)
    }
}

pub enum SegmentCacheStatus {
    Hit { corrected_text: String },
    Miss { reason: String },
}

/// Apply spec.md §4.4's coverage rule: a hit requires the union of
/// covered chunk durations to account for >= `coverage_threshold` of the
/// segment's duration AND every covering chunk to have a non-error row.
pub fn classify_segment(
    segment: &SpeakerSegment,
    assembled: &AssembledAudio,
    cache: &TranscriptionCache,
    coverage_threshold: f64,
) -> SegmentCacheStatus {
    let covering = assembled.covering_chunks(segment.start_time, segment.end_time);
    if covering.is_empty() {
        return SegmentCacheStatus::Miss {
            reason: "no covering chunks".into(),
        };
    }

    let coverage = assembled.coverage_fraction(segment.start_time, segment.end_time, &covering);
    if coverage < coverage_threshold {
        return SegmentCacheStatus::Miss {
            reason: format!("coverage {:.2} below threshold {:.2}", coverage, coverage_threshold),
        };
    }

    let mut sorted_covering = covering.clone();
    sorted_covering.sort_unstable();

    let mut pieces = Vec::with_capacity(sorted_covering.len());
    for chunk_number in &sorted_covering {
        match cache.get(*chunk_number) {
            Some(row) if !row.is_error() => {
                pieces.push(row.corrected_text.clone().unwrap_or_default());
            }
            Some(row) => {
                return SegmentCacheStatus::Miss {
                    reason: format!(
                        "chunk {} has an error row: {}",
                        chunk_number,
                        row.error.clone().unwrap_or_default()
                    )
                }
            }
            None => {
                return SegmentCacheStatus::Miss {
                    reason: format!("chunk {chunk_number} has no cache row"),
                }
            }
        }
    }

    SegmentCacheStatus::Hit {
        corrected_text: pieces.join(" "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{assemble, DecodedChunk};
    use chrono::Utc;

    fn two_chunk_audio() -> AssembledAudio {
        let a = DecodedChunk {
            chunk_number: 1,
            samples: vec![0; 30 * crate::audio::TARGET_SAMPLE_RATE as usize],
        };
        let b = DecodedChunk {
            chunk_number: 2,
            samples: vec![0; 30 * crate::audio::TARGET_SAMPLE_RATE as usize],
        };
        assemble(vec![a, b])
    }

    fn row(chunk_number: u32, text: &str) -> ChunkTranscription {
        ChunkTranscription {
            session_id: uuid::Uuid::new_v4(),
            chunk_number,
            raw_text: Some(text.to_string()),
            corrected_text: Some(text.to_string()),
            word_counts: None,
            duration_seconds: 30.0,
            transcribed_at: Some(Utc::now()),
            error: None,
        }
    }

    #[test]
    fn full_coverage_with_good_rows_is_a_hit() {
        let assembled = two_chunk_audio();
        let cache = TranscriptionCache::from_rows(vec![
            row(1, "wah this food shiok lah"),
            row(2, "paiseh lah"),
        ]);
        let segment = SpeakerSegment {
            speaker_label: "S0".into(),
            start_time: 0.0,
            end_time: 60.0,
            overlap_flag: false,
        };
        match classify_segment(&segment, &assembled, &cache, 0.80) {
            SegmentCacheStatus::Hit { corrected_text } => {
                assert_eq!(corrected_text, "wah this food shiok lah paiseh lah");
            }
            SegmentCacheStatus::Miss { reason } => panic!("expected hit, got miss: {reason}"),
        }
    }

    #[test]
    fn error_row_in_a_covering_chunk_is_a_miss() {
        let assembled = two_chunk_audio();
        let mut error_row = row(1, "");
        error_row.corrected_text = None;
        error_row.error = Some("timeout".into());
        let cache = TranscriptionCache::from_rows(vec![error_row]);
        let segment = SpeakerSegment {
            speaker_label: "S0".into(),
            start_time: 0.0,
            end_time: 30.0,
            overlap_flag: false,
        };
        match classify_segment(&segment, &assembled, &cache, 0.80) {
            SegmentCacheStatus::Hit { .. } => panic!("expected miss"),
            SegmentCacheStatus::Miss { .. } => {}
        }
    }

    #[test]
    fn partial_coverage_below_threshold_is_a_miss() {
        let assembled = two_chunk_audio();
        let cache = TranscriptionCache::from_rows(vec![row(1, "partial")]);
        // Segment spans both chunks but chunk 2 has no cache row at all.
        let segment = SpeakerSegment {
            speaker_label: "S0".into(),
            start_time: 0.0,
            end_time: 60.0,
            overlap_flag: false,
        };
        match classify_segment(&segment, &assembled, &cache, 0.80) {
            SegmentCacheStatus::Hit { .. } => panic!("expected miss"),
            SegmentCacheStatus::Miss { .. } => {}
        }
    }
}
