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

//! Progress/status side-channel (spec.md §4.7), grounded on the
//! assistant's `RecordingEvent::StatusUpdate` pattern in
//! `meeting_recorder.rs`. Writes are idempotent and monotonically
//! non-decreasing in progress while status is non-terminal.

use crate::error::PipelineError;
use crate::repository::Repository;
use crate::types::SessionStatus;
use std::sync::atomic::{AtomicU8, Ordering};
use uuid::Uuid;

pub struct ProgressReporter<'a, R> {
    repository: &'a R,
    session_id: Uuid,
    last_progress: AtomicU8,
}

impl<'a, R: Repository> ProgressReporter<'a, R> {
    pub fn new(repository: &'a R, session_id: Uuid) -> Self {
        Self {
            repository,
            session_id,
            last_progress: AtomicU8::new(0),
        }
    }

    /// Report `progress` under a non-terminal `status`. Silently clamps
    /// to the last reported value if `progress` would regress, preserving
    /// the monotonicity property tests check (spec.md §8).
    pub async fn report(&self, status: SessionStatus, progress: u8) -> Result<(), PipelineError> {
        let last = self.last_progress.load(Ordering::SeqCst);
        let clamped = progress.max(last);
        self.last_progress.store(clamped, Ordering::SeqCst);
        tracing::debug!(session_id = %self.session_id, status = %status, progress = clamped, "progress update");
        self.repository
            .set_session_status(self.session_id, status, Some(clamped), None)
            .await
    }

    pub async fn complete(&self) -> Result<(), PipelineError> {
        self.report(SessionStatus::ReadyForClaiming, 100).await
    }

    pub async fn fail(&self, error_message: String) -> Result<(), PipelineError> {
        tracing::warn!(session_id = %self.session_id, error = %error_message, "session failed");
        self.repository
            .set_session_status(self.session_id, SessionStatus::Failed, Some(100), Some(error_message))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use crate::types::Session;

    #[tokio::test]
    async fn progress_never_regresses() {
        let repo = InMemoryRepository::new();
        let session_id = Uuid::new_v4();
        repo.seed_session(Session::new(session_id)).await;
        let reporter = ProgressReporter::new(&repo, session_id);

        reporter.report(SessionStatus::Processing, 40).await.unwrap();
        reporter.report(SessionStatus::Processing, 10).await.unwrap();

        let session = repo.get_session(session_id).await.unwrap();
        assert_eq!(session.progress, 40);
    }

    #[tokio::test]
    async fn complete_sets_ready_for_claiming_and_full_progress() {
        let repo = InMemoryRepository::new();
        let session_id = Uuid::new_v4();
        repo.seed_session(Session::new(session_id)).await;
        let reporter = ProgressReporter::new(&repo, session_id);

        reporter.complete().await.unwrap();
        let session = repo.get_session(session_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::ReadyForClaiming);
        assert_eq!(session.progress, 100);
    }
}
