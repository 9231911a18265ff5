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

//! Per-speaker representative clip selection and extraction (spec.md
//! §4.6).

use crate::audio::{encode_wav, AssembledAudio};
use crate::blobstore::BlobStore;
use crate::error::PipelineError;
use crate::types::SpeakerSegment;
use uuid::Uuid;

/// Selected (start_time, clip duration) for a speaker's sample, following
/// spec.md §4.6's ordered selection policy.
pub fn select_sample_window(segments: &[&SpeakerSegment], sample_length_seconds: f64) -> (f64, f64) {
    assert!(!segments.is_empty(), "speaker must have at least one segment");

    let non_overlapping_long = segments
        .iter()
        .filter(|s| !s.overlap_flag && s.duration() >= sample_length_seconds)
        .max_by(|a, b| a.duration().partial_cmp(&b.duration()).unwrap());

    let chosen = non_overlapping_long.unwrap_or_else(|| {
        segments
            .iter()
            .max_by(|a, b| a.duration().partial_cmp(&b.duration()).unwrap())
            .expect("non-empty")
    });

    let offset = if chosen.duration() >= sample_length_seconds + 0.5 {
        chosen.start_time + 0.5
    } else {
        chosen.start_time
    };

    let length = sample_length_seconds.min(chosen.duration());
    (offset, length)
}

pub async fn extract_and_store<B: BlobStore>(
    blob_store: &B,
    session_id: Uuid,
    speaker_label: &str,
    assembled: &AssembledAudio,
    segments: &[&SpeakerSegment],
    sample_length_seconds: f64,
) -> Result<(String, f64), PipelineError> {
    let (start, length) = select_sample_window(segments, sample_length_seconds);
    let pcm = assembled.slice(start, start + length);
    let wav_bytes = encode_wav(&pcm)?;

    let path = format!("sessions/{session_id}/samples/{speaker_label}.wav");
    let stored_path = blob_store.put_bytes(&path, wav_bytes).await?;
    Ok((stored_path, start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, overlap: bool) -> SpeakerSegment {
        SpeakerSegment {
            speaker_label: "S0".into(),
            start_time: start,
            end_time: end,
            overlap_flag: overlap,
        }
    }

    #[test]
    fn prefers_longest_non_overlapping_segment_over_threshold() {
        let short = seg(0.0, 2.0, false);
        let long = seg(10.0, 20.0, false);
        let overlapping_longer = seg(30.0, 50.0, true);
        let segments = vec![&short, &long, &overlapping_longer];
        let (offset, length) = select_sample_window(&segments, 5.0);
        assert_eq!(offset, 10.5);
        assert_eq!(length, 5.0);
    }

    #[test]
    fn falls_back_to_longest_overall_when_no_segment_meets_length() {
        let a = seg(0.0, 2.0, false);
        let b = seg(5.0, 8.0, true);
        let segments = vec![&a, &b];
        let (offset, length) = select_sample_window(&segments, 5.0);
        assert_eq!(offset, 5.0); // b's duration (3s) < 5.0 + 0.5, so no +0.5 offset
        assert_eq!(length, 3.0);
    }

    #[test]
    fn offset_skips_half_second_only_when_segment_long_enough() {
        let exact = seg(0.0, 5.0, false);
        let segments = vec![&exact];
        let (offset, length) = select_sample_window(&segments, 5.0);
        assert_eq!(offset, 0.0);
        assert_eq!(length, 5.0);
    }
}
