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

//! Error taxonomy for the pipeline core. Unrecoverable errors propagate as
//! [`PipelineError`] and push a session to `failed`; per-segment
//! transcription failures are recovered locally and never reach this type
//! (see [`crate::processor`]).

use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("session {0} has no chunks or is missing chunk numbers")]
    IncompleteSession(Uuid),

    #[error("chunk {chunk_number} in session {session_id} could not be decoded: {message}")]
    Format {
        session_id: Uuid,
        chunk_number: u32,
        message: String,
    },

    #[error("model credential missing or invalid: {0}")]
    Auth(String),

    #[error("diarization failed: {0}")]
    Diarization(String),

    #[error("blob storage error: {0}")]
    Storage(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("session {0} not found")]
    SessionNotFound(Uuid),
}

