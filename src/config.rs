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

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Singlish vocabulary counted in results. See `GLOSSARY` in spec.md.
pub const DEFAULT_TARGET_WORDS: &[&str] = &[
    "walao", "cheebai", "lanjiao", "lah", "lor", "sia", "meh", "can", "paiseh", "shiok", "sian",
];

/// Ordered multi-word -> canonical substitution table applied before
/// counting. Order matters only when one output could match another's
/// input; see `corrections.rs` for the single-pass scan that relies on it.
pub const DEFAULT_CORRECTIONS: &[(&str, &str)] = &[
    ("wa lao", "walao"),
    ("wa lau", "walao"),
    ("walau", "walao"),
    ("pai seh", "paiseh"),
    ("chee bai", "cheebai"),
    ("cheap buy", "cheebai"),
    ("lan jiao", "lanjiao"),
];

#[derive(Debug, Clone)]
pub struct ModelCredentials {
    pub diarizer_token: String,
    pub transcriber_token: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub target_words: Vec<String>,
    pub corrections: Vec<(String, String)>,
    pub segment_cache_coverage_threshold: f64,
    pub max_parallel_live_transcriptions: usize,
    pub sample_length_seconds: f64,
    pub overlap_tolerance_seconds: f64,
    pub exclude_overlap_from_counts: bool,
    pub segment_timeout_seconds: u64,
    pub temp_dir: PathBuf,
    pub credentials: ModelCredentials,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_words: DEFAULT_TARGET_WORDS.iter().map(|s| s.to_string()).collect(),
            corrections: DEFAULT_CORRECTIONS
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            segment_cache_coverage_threshold: 0.80,
            max_parallel_live_transcriptions: 3,
            sample_length_seconds: 5.0,
            overlap_tolerance_seconds: 0.1,
            exclude_overlap_from_counts: false,
            segment_timeout_seconds: 60,
            temp_dir: env::temp_dir().join("voiceclaim"),
            credentials: ModelCredentials {
                diarizer_token: String::new(),
                transcriber_token: String::new(),
            },
        }
    }
}

impl Config {
    /// Load configuration from the environment, following the assistant's
    /// `dotenv` + fail-fast-on-missing-credential convention.
    pub async fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let diarizer_token = env::var("DIARIZER_MODEL_TOKEN")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .context("DIARIZER_MODEL_TOKEN (or OPENAI_API_KEY) environment variable not found")?;

        let transcriber_token = env::var("TRANSCRIBER_MODEL_TOKEN")
            .or_else(|_| env::var("OPENAI_API_KEY"))
            .context("TRANSCRIBER_MODEL_TOKEN (or OPENAI_API_KEY) environment variable not found")?;

        let segment_cache_coverage_threshold = env::var("SEGMENT_CACHE_COVERAGE_THRESHOLD")
            .unwrap_or_else(|_| "0.80".to_string())
            .parse::<f64>()
            .unwrap_or(0.80);

        let max_parallel_live_transcriptions = env::var("MAX_PARALLEL_LIVE_TRANSCRIPTIONS")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<usize>()
            .unwrap_or(3);

        let sample_length_seconds = env::var("SAMPLE_LENGTH_SECONDS")
            .unwrap_or_else(|_| "5.0".to_string())
            .parse::<f64>()
            .unwrap_or(5.0);

        let overlap_tolerance_seconds = env::var("OVERLAP_TOLERANCE_SECONDS")
            .unwrap_or_else(|_| "0.1".to_string())
            .parse::<f64>()
            .unwrap_or(0.1);

        let exclude_overlap_from_counts = env::var("EXCLUDE_OVERLAP_FROM_COUNTS")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let segment_timeout_seconds = env::var("SEGMENT_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<u64>()
            .unwrap_or(60);

        let temp_dir = env::var("TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("voiceclaim"));

        std::fs::create_dir_all(&temp_dir).context("Failed to create temporary directory")?;

        let defaults = Self::default();

        Ok(Self {
            target_words: defaults.target_words,
            corrections: defaults.corrections,
            segment_cache_coverage_threshold,
            max_parallel_live_transcriptions,
            sample_length_seconds,
            overlap_tolerance_seconds,
            exclude_overlap_from_counts,
            segment_timeout_seconds,
            temp_dir,
            credentials: ModelCredentials {
                diarizer_token,
                transcriber_token,
            },
        })
    }

    pub fn target_words_set(&self) -> std::collections::HashSet<String> {
        self.target_words.iter().cloned().collect()
    }

    pub fn get_temp_file(&self, prefix: &str, extension: &str) -> PathBuf {
        let timestamp = chrono::Utc::now().timestamp_millis();
        self.temp_dir
            .join(format!("{}_{}.{}", prefix, timestamp, extension))
    }
}
