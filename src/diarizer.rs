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

//! Speaker diarization capability (spec.md §4.2). `SpectralDiarizer` is a
//! from-scratch energy-VAD + spectral-centroid clustering pipeline, ported
//! out of the assistant's plugin-event wrapper
//! (`plugins/rust_native_diarization.rs`) into a plain, directly callable
//! capability behind the `Diarizer` trait, with warm-up guarded by a
//! `ModelHandle` rather than a global singleton.

use crate::model_handle::ModelHandle;
use crate::types::SpeakerSegment;
use async_trait::async_trait;
use std::cmp::Ordering;

#[derive(Debug, thiserror::Error)]
pub enum DiarizerError {
    #[error("diarization model unavailable: {0}")]
    Auth(String),
    #[error("diarization failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Diarizer: Send + Sync {
    /// Warm up the underlying model. Safe to call concurrently; at most
    /// one real load happens, shared by all callers (spec.md §4.2).
    async fn warm_up(&self) -> Result<(), DiarizerError>;

    /// `(samples_16khz_mono) -> ordered list of SpeakerSegment`, sorted by
    /// `start_time` ascending, ties by `end_time` then label.
    async fn diarize(
        &self,
        samples: &[i16],
        overlap_tolerance_seconds: f64,
    ) -> Result<Vec<SpeakerSegment>, DiarizerError>;
}

#[derive(Debug, Clone)]
pub struct SpectralDiarizerConfig {
    pub vad_energy_multiplier: f64,
    pub min_speech_duration_seconds: f64,
    pub speaker_similarity_threshold: f64,
    pub frame_size: usize,
    pub hop_size: usize,
}

impl Default for SpectralDiarizerConfig {
    fn default() -> Self {
        Self {
            vad_energy_multiplier: 1.2,
            min_speech_duration_seconds: 0.3,
            speaker_similarity_threshold: 0.65,
            frame_size: 1024,
            hop_size: 512,
        }
    }
}

/// Lightweight per-frame spectral descriptor: zero-crossing rate, a
/// spectral-centroid proxy computed directly in the time domain (no FFT
/// dependency), and RMS energy. Cheap but enough to separate distinct
/// speakers by voice timbre for clustering purposes.
#[derive(Debug, Clone)]
struct FrameFeatures {
    zcr: f64,
    centroid_proxy: f64,
    energy: f64,
}

fn frame_features(frame: &[f32]) -> FrameFeatures {
    let energy = (frame.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>() / frame.len() as f64).sqrt();

    let mut crossings = 0usize;
    for w in frame.windows(2) {
        if (w[0] >= 0.0) != (w[1] >= 0.0) {
            crossings += 1;
        }
    }
    let zcr = crossings as f64 / (frame.len().saturating_sub(1)).max(1) as f64;

    // Weighted-by-index "centroid" of the rectified waveform: a cheap,
    // FFT-free proxy for spectral centroid that still separates speakers
    // with clearly different pitch/brightness.
    let mut weighted_sum = 0.0;
    let mut magnitude_sum = 0.0;
    for (i, &s) in frame.iter().enumerate() {
        let mag = (s as f64).abs();
        weighted_sum += mag * i as f64;
        magnitude_sum += mag;
    }
    let centroid_proxy = if magnitude_sum > 0.0 {
        weighted_sum / magnitude_sum / frame.len() as f64
    } else {
        0.0
    };

    FrameFeatures {
        zcr,
        centroid_proxy,
        energy,
    }
}

struct SpeechSegment {
    start_time: f64,
    end_time: f64,
    embedding: Vec<f64>,
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub struct SpectralDiarizer {
    config: SpectralDiarizerConfig,
    api_key: String,
    model: ModelHandle<()>,
}

impl SpectralDiarizer {
    pub fn new(config: SpectralDiarizerConfig, api_key: String) -> Self {
        Self {
            config,
            api_key,
            model: ModelHandle::new(),
        }
    }

    fn detect_speech_segments(&self, samples: &[i16], sample_rate: u32) -> Vec<SpeechSegment> {
        let floats: Vec<f32> = samples.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
        let frame_size = self.config.frame_size;
        let hop_size = self.config.hop_size;

        let mut frames = Vec::new();
        let mut frame_times = Vec::new();
        let mut i = 0;
        while i + frame_size <= floats.len().max(frame_size) && i < floats.len() {
            let end = (i + frame_size).min(floats.len());
            frames.push(frame_features(&floats[i..end]));
            frame_times.push(i as f64 / sample_rate as f64);
            i += hop_size;
        }
        if frames.is_empty() {
            return Vec::new();
        }

        let mean_energy = frames.iter().map(|f| f.energy).sum::<f64>() / frames.len() as f64;
        let variance = frames
            .iter()
            .map(|f| (f.energy - mean_energy).powi(2))
            .sum::<f64>()
            / frames.len() as f64;
        let std_dev = variance.sqrt();
        let threshold = mean_energy + self.config.vad_energy_multiplier * std_dev * 0.1;

        let mut segments = Vec::new();
        let mut in_speech = false;
        let mut start_idx = 0usize;
        let mut embedding_acc: Vec<(f64, f64)> = Vec::new(); // (zcr, centroid) running sum

        for (idx, frame) in frames.iter().enumerate() {
            let is_speech = frame.energy > threshold;
            if is_speech && !in_speech {
                in_speech = true;
                start_idx = idx;
                embedding_acc.clear();
            }
            if is_speech {
                embedding_acc.push((frame.zcr, frame.centroid_proxy));
            }
            if in_speech && (!is_speech || idx == frames.len() - 1) {
                let end_idx = if is_speech { idx + 1 } else { idx };
                let start_time = frame_times[start_idx];
                let end_time = frame_times
                    .get(end_idx)
                    .copied()
                    .unwrap_or_else(|| floats.len() as f64 / sample_rate as f64);
                if end_time - start_time >= self.config.min_speech_duration_seconds
                    && !embedding_acc.is_empty()
                {
                    let n = embedding_acc.len() as f64;
                    let mean_zcr = embedding_acc.iter().map(|(z, _)| z).sum::<f64>() / n;
                    let mean_centroid = embedding_acc.iter().map(|(_, c)| c).sum::<f64>() / n;
                    segments.push(SpeechSegment {
                        start_time,
                        end_time,
                        embedding: vec![mean_zcr, mean_centroid],
                    });
                }
                in_speech = false;
            }
        }

        segments
    }

    fn cluster(&self, segments: Vec<SpeechSegment>) -> Vec<(SpeechSegment, String)> {
        let mut centroids: Vec<(String, Vec<f64>)> = Vec::new();
        let mut labeled = Vec::with_capacity(segments.len());

        for segment in segments {
            let mut best: Option<(usize, f64)> = None;
            for (i, (_, centroid)) in centroids.iter().enumerate() {
                let sim = cosine_similarity(&segment.embedding, centroid);
                if sim >= self.config.speaker_similarity_threshold {
                    if best.map(|(_, b)| sim > b).unwrap_or(true) {
                        best = Some((i, sim));
                    }
                }
            }

            let label = if let Some((i, _)) = best {
                let (label, centroid) = &mut centroids[i];
                for (c, e) in centroid.iter_mut().zip(&segment.embedding) {
                    *c = *c * 0.7 + e * 0.3;
                }
                label.clone()
            } else {
                let label = format!("S{}", centroids.len());
                centroids.push((label.clone(), segment.embedding.clone()));
                label
            };

            labeled.push((segment, label));
        }

        labeled
    }
}

#[async_trait]
impl Diarizer for SpectralDiarizer {
    async fn warm_up(&self) -> Result<(), DiarizerError> {
        if self.api_key.is_empty() {
            return Err(DiarizerError::Auth("missing diarizer model token".into()));
        }
        self.model
            .get_or_init(|| async { Ok::<(), DiarizerError>(()) })
            .await?;
        Ok(())
    }

    async fn diarize(
        &self,
        samples: &[i16],
        overlap_tolerance_seconds: f64,
    ) -> Result<Vec<SpeakerSegment>, DiarizerError> {
        self.warm_up().await?;

        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let speech_segments = self.detect_speech_segments(samples, crate::audio::TARGET_SAMPLE_RATE);
        let labeled = self.cluster(speech_segments);

        let mut segments: Vec<SpeakerSegment> = labeled
            .into_iter()
            .map(|(seg, label)| SpeakerSegment {
                speaker_label: label,
                start_time: seg.start_time,
                end_time: seg.end_time,
                overlap_flag: false,
            })
            .collect();

        sort_segments(&mut segments);
        mark_overlaps(&mut segments, overlap_tolerance_seconds);
        Ok(segments)
    }
}

fn sort_segments(segments: &mut [SpeakerSegment]) {
    segments.sort_by(|a, b| {
        a.start_time
            .partial_cmp(&b.start_time)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.end_time.partial_cmp(&b.end_time).unwrap_or(Ordering::Equal))
            .then_with(|| a.speaker_label.cmp(&b.speaker_label))
    });
}

fn mark_overlaps(segments: &mut [SpeakerSegment], tolerance_seconds: f64) {
    for i in 0..segments.len() {
        for j in 0..segments.len() {
            if i == j {
                continue;
            }
            let overlap = segments[i].end_time.min(segments[j].end_time)
                - segments[i].start_time.max(segments[j].start_time);
            if overlap > tolerance_seconds {
                segments[i].overlap_flag = true;
                break;
            }
        }
    }
}

/// Deterministic test double: takes a pre-baked segment list.
pub struct FakeDiarizer {
    pub segments: Vec<SpeakerSegment>,
}

#[async_trait]
impl Diarizer for FakeDiarizer {
    async fn warm_up(&self) -> Result<(), DiarizerError> {
        Ok(())
    }

    async fn diarize(
        &self,
        _samples: &[i16],
        overlap_tolerance_seconds: f64,
    ) -> Result<Vec<SpeakerSegment>, DiarizerError> {
        let mut segments = self.segments.clone();
        sort_segments(&mut segments);
        mark_overlaps(&mut segments, overlap_tolerance_seconds);
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_orders_by_start_then_end_then_label() {
        let mut segments = vec![
            SpeakerSegment {
                speaker_label: "S1".into(),
                start_time: 1.0,
                end_time: 2.0,
                overlap_flag: false,
            },
            SpeakerSegment {
                speaker_label: "S0".into(),
                start_time: 0.0,
                end_time: 1.0,
                overlap_flag: false,
            },
        ];
        sort_segments(&mut segments);
        assert_eq!(segments[0].speaker_label, "S0");
        assert_eq!(segments[1].speaker_label, "S1");
    }

    #[test]
    fn overlap_marked_above_tolerance() {
        let mut segments = vec![
            SpeakerSegment {
                speaker_label: "S0".into(),
                start_time: 0.0,
                end_time: 5.0,
                overlap_flag: false,
            },
            SpeakerSegment {
                speaker_label: "S1".into(),
                start_time: 4.5,
                end_time: 9.0,
                overlap_flag: false,
            },
        ];
        mark_overlaps(&mut segments, 0.1);
        assert!(segments[0].overlap_flag);
        assert!(segments[1].overlap_flag);
    }

    #[test]
    fn small_overlap_within_tolerance_not_marked() {
        let mut segments = vec![
            SpeakerSegment {
                speaker_label: "S0".into(),
                start_time: 0.0,
                end_time: 5.0,
                overlap_flag: false,
            },
            SpeakerSegment {
                speaker_label: "S1".into(),
                start_time: 4.95,
                end_time: 9.0,
                overlap_flag: false,
            },
        ];
        mark_overlaps(&mut segments, 0.1);
        assert!(!segments[0].overlap_flag);
        assert!(!segments[1].overlap_flag);
    }

    #[tokio::test]
    async fn fake_diarizer_returns_configured_segments_sorted() {
        let fake = FakeDiarizer {
            segments: vec![
                SpeakerSegment {
                    speaker_label: "S1".into(),
                    start_time: 10.0,
                    end_time: 25.0,
                    overlap_flag: false,
                },
                SpeakerSegment {
                    speaker_label: "S0".into(),
                    start_time: 0.0,
                    end_time: 10.0,
                    overlap_flag: false,
                },
            ],
        };
        let result = fake.diarize(&[], 0.1).await.unwrap();
        assert_eq!(result[0].speaker_label, "S0");
        assert_eq!(result[1].speaker_label, "S1");
    }
}
