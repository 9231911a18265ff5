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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Word -> occurrence count. Keys are always a subset of `TARGET_WORDS`.
pub type WordCounts = HashMap<String, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Recording,
    Processing,
    ReadyForClaiming,
    Completed,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Recording => "recording",
            SessionStatus::Processing => "processing",
            SessionStatus::ReadyForClaiming => "ready_for_claiming",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl SessionStatus {
    /// Ordinal used to check that transitions are monotonic, except that
    /// `Failed` is reachable from any non-terminal state.
    fn ordinal(self) -> u8 {
        match self {
            SessionStatus::Recording => 0,
            SessionStatus::Processing => 1,
            SessionStatus::ReadyForClaiming => 2,
            SessionStatus::Completed => 3,
            SessionStatus::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::ReadyForClaiming | SessionStatus::Completed | SessionStatus::Failed
        )
    }

    /// Whether `self -> next` is a legal transition per spec.md §3's
    /// "monotonic along the enumerated order except `failed`" rule.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        if next == SessionStatus::Failed {
            return !self.is_terminal() || self == SessionStatus::Failed;
        }
        next.ordinal() >= self.ordinal()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub status: SessionStatus,
    pub progress: u8,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub error: Option<String>,
}

impl Session {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            status: SessionStatus::Recording,
            progress: 0,
            started_at: Utc::now(),
            ended_at: None,
            duration_seconds: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunk {
    pub session_id: Uuid,
    pub chunk_number: u32,
    pub blob_path: String,
    pub duration_seconds: f64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkTranscription {
    pub session_id: Uuid,
    pub chunk_number: u32,
    pub raw_text: Option<String>,
    pub corrected_text: Option<String>,
    /// Advisory only — see DESIGN.md open question 1. The `Processor`
    /// never sums these; it recomputes from concatenated `corrected_text`.
    pub word_counts: Option<WordCounts>,
    pub duration_seconds: f64,
    pub transcribed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ChunkTranscription {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerSegment {
    pub speaker_label: String,
    pub start_time: f64,
    pub end_time: f64,
    pub overlap_flag: bool,
}

impl SpeakerSegment {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerResult {
    pub session_id: Uuid,
    pub speaker_label: String,
    pub segment_count: u32,
    pub total_duration: f64,
    pub sample_blob_path: String,
    pub sample_start_time: f64,
    pub word_counts: WordCounts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotonic_except_failed() {
        assert!(SessionStatus::Recording.can_transition_to(SessionStatus::Processing));
        assert!(SessionStatus::Processing.can_transition_to(SessionStatus::ReadyForClaiming));
        assert!(!SessionStatus::ReadyForClaiming.can_transition_to(SessionStatus::Processing));
        assert!(SessionStatus::Recording.can_transition_to(SessionStatus::Failed));
        assert!(SessionStatus::Processing.can_transition_to(SessionStatus::Failed));
        assert!(!SessionStatus::Failed.can_transition_to(SessionStatus::Recording));
    }
}
