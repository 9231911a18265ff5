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

//! Chunk decode, canonicalization to 16 kHz mono 16-bit PCM WAV, assembly,
//! and time-range slicing. All audio in the system is canonicalized to
//! this format per spec.md §4.1 / §6.

use crate::error::PipelineError;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;
use uuid::Uuid;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;
pub const TARGET_CHANNELS: u16 = 1;
pub const TARGET_BITS_PER_SAMPLE: u16 = 16;

pub fn canonical_spec() -> WavSpec {
    WavSpec {
        channels: TARGET_CHANNELS,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: TARGET_BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    }
}

/// One chunk decoded to canonical 16 kHz mono i16 PCM.
pub struct DecodedChunk {
    pub chunk_number: u32,
    pub samples: Vec<i16>,
}

impl DecodedChunk {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / TARGET_SAMPLE_RATE as f64
    }
}

/// Decode a self-contained WAV chunk (its own container header) to
/// canonical 16 kHz mono i16 PCM, resampling/downmixing if necessary.
pub fn decode_chunk(
    session_id: Uuid,
    chunk_number: u32,
    bytes: &[u8],
) -> Result<DecodedChunk, PipelineError> {
    let cursor = Cursor::new(bytes);
    let mut reader = WavReader::new(cursor).map_err(|e| PipelineError::Format {
        session_id,
        chunk_number,
        message: format!("could not parse WAV header: {e}"),
    })?;
    let spec = reader.spec();

    let raw_samples: Vec<i32> = match spec.sample_format {
        SampleFormat::Int => reader
            .samples::<i32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PipelineError::Format {
                session_id,
                chunk_number,
                message: format!("could not read PCM samples: {e}"),
            })?,
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v * i16::MAX as f32) as i32))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PipelineError::Format {
                session_id,
                chunk_number,
                message: format!("could not read float samples: {e}"),
            })?,
    };

    let downmixed = downmix_to_mono(&raw_samples, spec.channels as usize);
    let resampled = resample_linear(&downmixed, spec.sample_rate, TARGET_SAMPLE_RATE);

    Ok(DecodedChunk {
        chunk_number,
        samples: resampled,
    })
}

fn downmix_to_mono(samples: &[i32], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.iter().map(|&s| clamp_i16(s)).collect();
    }
    samples
        .chunks(channels)
        .map(|frame| {
            let sum: i64 = frame.iter().map(|&s| s as i64).sum();
            clamp_i16((sum / channels as i64) as i32)
        })
        .collect()
}

fn clamp_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

/// Rational linear resampler. Good enough for voice-grade 16 kHz targets;
/// the assistant's own DSP code (`rust_native_diarization`) hand-rolls
/// comparable numeric work rather than reaching for an extra crate, so we
/// follow that idiom here instead of adding a resampling dependency.
fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = ((samples.len() as f64) * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = src_pos - idx as f64;
        let a = samples.get(idx).copied().unwrap_or(0) as f64;
        let b = samples.get(idx + 1).copied().unwrap_or(a as i16) as f64;
        out.push((a + (b - a) * frac).round() as i16);
    }
    out
}

/// One assembled session's worth of canonical PCM plus the per-chunk
/// sample offsets needed for segment -> chunk coverage mapping.
pub struct AssembledAudio {
    pub samples: Vec<i16>,
    /// (chunk_number, start_sample, end_sample) in assembled-audio order.
    pub chunk_ranges: Vec<(u32, usize, usize)>,
}

impl AssembledAudio {
    pub fn total_duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / TARGET_SAMPLE_RATE as f64
    }

    /// Extract `[start_s, end_s)` as canonical PCM, clamped to bounds.
    pub fn slice(&self, start_s: f64, end_s: f64) -> Vec<i16> {
        let start = ((start_s * TARGET_SAMPLE_RATE as f64).round() as usize).min(self.samples.len());
        let end = ((end_s * TARGET_SAMPLE_RATE as f64).round() as usize).min(self.samples.len());
        if end <= start {
            return Vec::new();
        }
        self.samples[start..end].to_vec()
    }

    /// Fraction of `[start_s, end_s)` covered by chunks in `chunk_numbers`,
    /// used by the TranscriptionCache coverage rule (spec.md §4.4).
    pub fn coverage_fraction(&self, start_s: f64, end_s: f64, chunk_numbers: &[u32]) -> f64 {
        let window_start = (start_s * TARGET_SAMPLE_RATE as f64).round() as usize;
        let window_end = (end_s * TARGET_SAMPLE_RATE as f64).round() as usize;
        if window_end <= window_start {
            return 0.0;
        }
        let mut covered = 0usize;
        for &(num, cs, ce) in &self.chunk_ranges {
            if !chunk_numbers.contains(&num) {
                continue;
            }
            let overlap_start = cs.max(window_start);
            let overlap_end = ce.min(window_end);
            if overlap_end > overlap_start {
                covered += overlap_end - overlap_start;
            }
        }
        covered as f64 / (window_end - window_start) as f64
    }

    /// Chunk numbers whose sample range intersects `[start_s, end_s)` at
    /// all — the candidate "covering chunks" for a segment.
    pub fn covering_chunks(&self, start_s: f64, end_s: f64) -> Vec<u32> {
        let window_start = (start_s * TARGET_SAMPLE_RATE as f64).round() as usize;
        let window_end = (end_s * TARGET_SAMPLE_RATE as f64).round() as usize;
        self.chunk_ranges
            .iter()
            .filter(|&&(_, cs, ce)| ce > window_start && cs < window_end)
            .map(|&(num, _, _)| num)
            .collect()
    }
}

/// Assemble ordered, decoded chunks into one canonical-format buffer.
/// Chunks must already be sorted by `chunk_number` (the ChunkStore's
/// ordering guarantee per spec.md §3).
pub fn assemble(decoded: Vec<DecodedChunk>) -> AssembledAudio {
    let mut samples = Vec::new();
    let mut chunk_ranges = Vec::with_capacity(decoded.len());
    for chunk in decoded {
        let start = samples.len();
        samples.extend_from_slice(&chunk.samples);
        let end = samples.len();
        chunk_ranges.push((chunk.chunk_number, start, end));
    }
    AssembledAudio {
        samples,
        chunk_ranges,
    }
}

/// Encode canonical PCM samples as a WAV byte buffer.
pub fn encode_wav(samples: &[i16]) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer =
            WavWriter::new(&mut buf, canonical_spec()).map_err(|e| PipelineError::Storage(e.to_string()))?;
        for &s in samples {
            writer
                .write_sample(s)
                .map_err(|e| PipelineError::Storage(e.to_string()))?;
        }
        writer.finalize().map_err(|e| PipelineError::Storage(e.to_string()))?;
    }
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut buf, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn decodes_already_canonical_chunk_unchanged() {
        let samples = vec![100i16, -100, 200, -200];
        let bytes = make_wav(&samples, 16_000, 1);
        let id = Uuid::new_v4();
        let decoded = decode_chunk(id, 1, &bytes).unwrap();
        assert_eq!(decoded.samples, samples);
    }

    #[test]
    fn downmixes_stereo_to_mono() {
        let stereo = vec![100i16, 200, -100, -200];
        let bytes = make_wav(&stereo, 16_000, 2);
        let id = Uuid::new_v4();
        let decoded = decode_chunk(id, 1, &bytes).unwrap();
        assert_eq!(decoded.samples, vec![150, -150]);
    }

    #[test]
    fn resamples_to_16khz() {
        let samples: Vec<i16> = (0..32_000).map(|i| (i % 100) as i16).collect();
        let bytes = make_wav(&samples, 32_000, 1);
        let id = Uuid::new_v4();
        let decoded = decode_chunk(id, 1, &bytes).unwrap();
        // 32kHz halved to 16kHz should roughly halve the sample count.
        assert!((decoded.samples.len() as i64 - 16_000).abs() < 10);
    }

    #[test]
    fn malformed_chunk_is_a_format_error() {
        let id = Uuid::new_v4();
        let err = decode_chunk(id, 1, b"not a wav file").unwrap_err();
        assert!(matches!(err, PipelineError::Format { .. }));
    }

    #[test]
    fn assembly_concatenates_in_chunk_number_order() {
        let a = DecodedChunk {
            chunk_number: 1,
            samples: vec![1, 2, 3],
        };
        let b = DecodedChunk {
            chunk_number: 2,
            samples: vec![4, 5],
        };
        let assembled = assemble(vec![a, b]);
        assert_eq!(assembled.samples, vec![1, 2, 3, 4, 5]);
        assert_eq!(assembled.chunk_ranges, vec![(1, 0, 3), (2, 3, 5)]);
    }

    #[test]
    fn coverage_fraction_counts_only_requested_chunks() {
        let a = DecodedChunk {
            chunk_number: 1,
            samples: vec![0; TARGET_SAMPLE_RATE as usize], // 1s
        };
        let b = DecodedChunk {
            chunk_number: 2,
            samples: vec![0; TARGET_SAMPLE_RATE as usize], // 1s
        };
        let assembled = assemble(vec![a, b]);
        let full = assembled.coverage_fraction(0.0, 2.0, &[1, 2]);
        assert!((full - 1.0).abs() < 1e-9);
        let half = assembled.coverage_fraction(0.0, 2.0, &[1]);
        assert!((half - 0.5).abs() < 1e-9);
    }
}
