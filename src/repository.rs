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

//! Durable state for sessions, chunks, transcription cache rows, and final
//! results, per spec.md §6. `SqliteRepository` is the real backend; the
//! `sqlx` dependency was declared but unused by the teacher's
//! `sqlite-storage` feature — this is its first real consumer.

use crate::error::PipelineError;
use crate::types::{AudioChunk, ChunkTranscription, Session, SessionStatus, SpeakerResult, WordCounts};
use async_trait::async_trait;
use chrono::Utc;
use serde_json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_session(&self, id: Uuid) -> Result<Session, PipelineError>;

    async fn list_chunks(&self, session_id: Uuid) -> Result<Vec<AudioChunk>, PipelineError>;

    async fn set_session_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        progress: Option<u8>,
        error: Option<String>,
    ) -> Result<(), PipelineError>;

    async fn upsert_chunk_transcription(
        &self,
        row: ChunkTranscription,
    ) -> Result<(), PipelineError>;

    async fn list_chunk_transcriptions(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ChunkTranscription>, PipelineError>;

    async fn save_speaker_results(
        &self,
        session_id: Uuid,
        results: Vec<SpeakerResult>,
    ) -> Result<(), PipelineError>;
}

// ---------------------------------------------------------------------
// In-memory test double
// ---------------------------------------------------------------------

#[derive(Default)]
struct InMemoryState {
    sessions: HashMap<Uuid, Session>,
    chunks: HashMap<Uuid, Vec<AudioChunk>>,
    transcriptions: HashMap<(Uuid, u32), ChunkTranscription>,
    results: HashMap<Uuid, Vec<SpeakerResult>>,
}

#[derive(Clone)]
pub struct InMemoryRepository {
    state: Arc<RwLock<InMemoryState>>,
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(InMemoryState::default())),
        }
    }

    pub async fn seed_session(&self, session: Session) {
        self.state.write().await.sessions.insert(session.id, session);
    }

    pub async fn seed_chunk(&self, chunk: AudioChunk) {
        let mut state = self.state.write().await;
        let chunks = state.chunks.entry(chunk.session_id).or_default();
        chunks.push(chunk);
        chunks.sort_by_key(|c| c.chunk_number);
    }

    pub async fn results_for(&self, session_id: Uuid) -> Vec<SpeakerResult> {
        self.state
            .read()
            .await
            .results
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_session(&self, id: Uuid) -> Result<Session, PipelineError> {
        self.state
            .read()
            .await
            .sessions
            .get(&id)
            .cloned()
            .ok_or(PipelineError::SessionNotFound(id))
    }

    async fn list_chunks(&self, session_id: Uuid) -> Result<Vec<AudioChunk>, PipelineError> {
        Ok(self
            .state
            .read()
            .await
            .chunks
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_session_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        progress: Option<u8>,
        error: Option<String>,
    ) -> Result<(), PipelineError> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(&id)
            .ok_or(PipelineError::SessionNotFound(id))?;
        session.status = status;
        if let Some(p) = progress {
            session.progress = p;
        }
        if error.is_some() {
            session.error = error;
        }
        if status.is_terminal() {
            session.ended_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn upsert_chunk_transcription(
        &self,
        row: ChunkTranscription,
    ) -> Result<(), PipelineError> {
        let mut state = self.state.write().await;
        let key = (row.session_id, row.chunk_number);
        match state.transcriptions.get(&key) {
            // "later non-error write wins": don't let a late error
            // overwrite a row that already has text.
            Some(existing) if existing.error.is_none() && row.error.is_some() => {}
            _ => {
                state.transcriptions.insert(key, row);
            }
        }
        Ok(())
    }

    async fn list_chunk_transcriptions(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ChunkTranscription>, PipelineError> {
        let state = self.state.read().await;
        let mut rows: Vec<ChunkTranscription> = state
            .transcriptions
            .iter()
            .filter(|((sid, _), _)| *sid == session_id)
            .map(|(_, v)| v.clone())
            .collect();
        rows.sort_by_key(|r| r.chunk_number);
        Ok(rows)
    }

    async fn save_speaker_results(
        &self,
        session_id: Uuid,
        results: Vec<SpeakerResult>,
    ) -> Result<(), PipelineError> {
        self.state.write().await.results.insert(session_id, results);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// Sqlite-backed repository
// ---------------------------------------------------------------------

pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub async fn connect(database_url: &str) -> Result<Self, PipelineError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| PipelineError::Repository(format!("connect: {e}")))?;
        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    async fn migrate(&self) -> Result<(), PipelineError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                duration_seconds REAL,
                error TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Repository(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audio_chunks (
                session_id TEXT NOT NULL,
                chunk_number INTEGER NOT NULL,
                blob_path TEXT NOT NULL,
                duration_seconds REAL NOT NULL,
                uploaded_at TEXT NOT NULL,
                PRIMARY KEY (session_id, chunk_number)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Repository(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_transcriptions (
                session_id TEXT NOT NULL,
                chunk_number INTEGER NOT NULL,
                raw_text TEXT,
                corrected_text TEXT,
                word_counts TEXT,
                duration_seconds REAL NOT NULL,
                transcribed_at TEXT,
                error TEXT,
                PRIMARY KEY (session_id, chunk_number)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Repository(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS speaker_results (
                session_id TEXT NOT NULL,
                speaker_label TEXT NOT NULL,
                segment_count INTEGER NOT NULL,
                total_duration REAL NOT NULL,
                sample_blob_path TEXT NOT NULL,
                sample_start_time REAL NOT NULL,
                word_counts TEXT NOT NULL,
                PRIMARY KEY (session_id, speaker_label)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Repository(e.to_string()))?;

        Ok(())
    }

    pub async fn insert_session(&self, session: &Session) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT OR REPLACE INTO sessions (id, status, progress, started_at, ended_at, duration_seconds, error)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(session.status.to_string())
        .bind(session.progress as i64)
        .bind(session.started_at.to_rfc3339())
        .bind(session.ended_at.map(|t| t.to_rfc3339()))
        .bind(session.duration_seconds)
        .bind(&session.error)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Repository(e.to_string()))?;
        Ok(())
    }

    pub async fn insert_chunk(&self, chunk: &AudioChunk) -> Result<(), PipelineError> {
        sqlx::query(
            "INSERT OR REPLACE INTO audio_chunks (session_id, chunk_number, blob_path, duration_seconds, uploaded_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(chunk.session_id.to_string())
        .bind(chunk.chunk_number as i64)
        .bind(&chunk.blob_path)
        .bind(chunk.duration_seconds)
        .bind(chunk.uploaded_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Repository(e.to_string()))?;
        Ok(())
    }

    fn row_to_session(&self, id: Uuid, row: sqlx::sqlite::SqliteRow) -> Result<Session, PipelineError> {
        Ok(Session {
            id,
            status: status_from_str(row.get::<String, _>("status").as_str()),
            progress: row.get::<i64, _>("progress") as u8,
            started_at: chrono::DateTime::parse_from_rfc3339(row.get::<String, _>("started_at").as_str())
                .map_err(|e| PipelineError::Repository(e.to_string()))?
                .with_timezone(&Utc),
            ended_at: row
                .get::<Option<String>, _>("ended_at")
                .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)))
                .transpose()
                .map_err(|e| PipelineError::Repository(e.to_string()))?,
            duration_seconds: row.get("duration_seconds"),
            error: row.get("error"),
        })
    }
}

fn status_from_str(s: &str) -> SessionStatus {
    match s {
        "recording" => SessionStatus::Recording,
        "processing" => SessionStatus::Processing,
        "ready_for_claiming" => SessionStatus::ReadyForClaiming,
        "completed" => SessionStatus::Completed,
        _ => SessionStatus::Failed,
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn get_session(&self, id: Uuid) -> Result<Session, PipelineError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PipelineError::Repository(e.to_string()))?
            .ok_or(PipelineError::SessionNotFound(id))?;

        self.row_to_session(id, row)
    }

    async fn list_chunks(&self, session_id: Uuid) -> Result<Vec<AudioChunk>, PipelineError> {
        let rows = sqlx::query("SELECT * FROM audio_chunks WHERE session_id = ? ORDER BY chunk_number")
            .bind(session_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::Repository(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                Ok(AudioChunk {
                    session_id,
                    chunk_number: row.get::<i64, _>("chunk_number") as u32,
                    blob_path: row.get("blob_path"),
                    duration_seconds: row.get("duration_seconds"),
                    uploaded_at: chrono::DateTime::parse_from_rfc3339(row.get::<String, _>("uploaded_at").as_str())
                        .map_err(|e| PipelineError::Repository(e.to_string()))?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }

    async fn set_session_status(
        &self,
        id: Uuid,
        status: SessionStatus,
        progress: Option<u8>,
        error: Option<String>,
    ) -> Result<(), PipelineError> {
        let ended_at = if status.is_terminal() {
            Some(Utc::now().to_rfc3339())
        } else {
            None
        };
        if let Some(p) = progress {
            sqlx::query(
                "UPDATE sessions SET status = ?, progress = ?, error = COALESCE(?, error), ended_at = COALESCE(?, ended_at) WHERE id = ?",
            )
            .bind(status.to_string())
            .bind(p as i64)
            .bind(error)
            .bind(ended_at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                "UPDATE sessions SET status = ?, error = COALESCE(?, error), ended_at = COALESCE(?, ended_at) WHERE id = ?",
            )
            .bind(status.to_string())
            .bind(error)
            .bind(ended_at)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
        }
        .map_err(|e| PipelineError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn upsert_chunk_transcription(
        &self,
        row: ChunkTranscription,
    ) -> Result<(), PipelineError> {
        // Later non-error write wins: don't overwrite a good row with an
        // error row (spec.md §8's upsert property).
        let existing = sqlx::query(
            "SELECT error FROM chunk_transcriptions WHERE session_id = ? AND chunk_number = ?",
        )
        .bind(row.session_id.to_string())
        .bind(row.chunk_number as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PipelineError::Repository(e.to_string()))?;

        if let Some(existing) = &existing {
            let existing_error: Option<String> = existing.get("error");
            if existing_error.is_none() && row.error.is_some() {
                return Ok(());
            }
        }

        let word_counts_json = row
            .word_counts
            .as_ref()
            .map(|wc| serde_json::to_string(wc).unwrap_or_default());

        sqlx::query(
            "INSERT OR REPLACE INTO chunk_transcriptions
             (session_id, chunk_number, raw_text, corrected_text, word_counts, duration_seconds, transcribed_at, error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.session_id.to_string())
        .bind(row.chunk_number as i64)
        .bind(&row.raw_text)
        .bind(&row.corrected_text)
        .bind(word_counts_json)
        .bind(row.duration_seconds)
        .bind(row.transcribed_at.map(|t| t.to_rfc3339()))
        .bind(&row.error)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::Repository(e.to_string()))?;
        Ok(())
    }

    async fn list_chunk_transcriptions(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<ChunkTranscription>, PipelineError> {
        let rows = sqlx::query(
            "SELECT * FROM chunk_transcriptions WHERE session_id = ? ORDER BY chunk_number",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::Repository(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let word_counts: Option<WordCounts> = row
                    .get::<Option<String>, _>("word_counts")
                    .and_then(|s| serde_json::from_str(&s).ok());
                Ok(ChunkTranscription {
                    session_id,
                    chunk_number: row.get::<i64, _>("chunk_number") as u32,
                    raw_text: row.get("raw_text"),
                    corrected_text: row.get("corrected_text"),
                    word_counts,
                    duration_seconds: row.get("duration_seconds"),
                    transcribed_at: row
                        .get::<Option<String>, _>("transcribed_at")
                        .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)))
                        .transpose()
                        .map_err(|e| PipelineError::Repository(e.to_string()))?,
                    error: row.get("error"),
                })
            })
            .collect()
    }

    async fn save_speaker_results(
        &self,
        session_id: Uuid,
        results: Vec<SpeakerResult>,
    ) -> Result<(), PipelineError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PipelineError::Repository(e.to_string()))?;

        sqlx::query("DELETE FROM speaker_results WHERE session_id = ?")
            .bind(session_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::Repository(e.to_string()))?;

        for result in &results {
            let word_counts_json =
                serde_json::to_string(&result.word_counts).unwrap_or_default();
            sqlx::query(
                "INSERT INTO speaker_results
                 (session_id, speaker_label, segment_count, total_duration, sample_blob_path, sample_start_time, word_counts)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(session_id.to_string())
            .bind(&result.speaker_label)
            .bind(result.segment_count as i64)
            .bind(result.total_duration)
            .bind(&result.sample_blob_path)
            .bind(result.sample_start_time)
            .bind(word_counts_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::Repository(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| PipelineError::Repository(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(session_id: Uuid, chunk_number: u32, error: Option<&str>) -> ChunkTranscription {
        ChunkTranscription {
            session_id,
            chunk_number,
            raw_text: if error.is_none() { Some("hi".into()) } else { None },
            corrected_text: if error.is_none() { Some("hi".into()) } else { None },
            word_counts: None,
            duration_seconds: 30.0,
            transcribed_at: Some(Utc::now()),
            error: error.map(|e| e.to_string()),
        }
    }

    #[tokio::test]
    async fn double_upsert_yields_one_row_later_non_error_wins() {
        let repo = InMemoryRepository::new();
        let session_id = Uuid::new_v4();

        repo.upsert_chunk_transcription(sample_row(session_id, 1, Some("timeout")))
            .await
            .unwrap();
        repo.upsert_chunk_transcription(sample_row(session_id, 1, None))
            .await
            .unwrap();

        let rows = repo.list_chunk_transcriptions(session_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].error.is_none());
    }

    #[tokio::test]
    async fn error_does_not_clobber_existing_good_row() {
        let repo = InMemoryRepository::new();
        let session_id = Uuid::new_v4();

        repo.upsert_chunk_transcription(sample_row(session_id, 1, None))
            .await
            .unwrap();
        repo.upsert_chunk_transcription(sample_row(session_id, 1, Some("retry failed")))
            .await
            .unwrap();

        let rows = repo.list_chunk_transcriptions(session_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].error.is_none());
    }

    #[tokio::test]
    async fn save_speaker_results_replaces_prior_results() {
        let repo = InMemoryRepository::new();
        let session_id = Uuid::new_v4();
        let make = |label: &str| SpeakerResult {
            session_id,
            speaker_label: label.to_string(),
            segment_count: 1,
            total_duration: 10.0,
            sample_blob_path: format!("sessions/{session_id}/samples/{label}.wav"),
            sample_start_time: 0.0,
            word_counts: WordCounts::new(),
        };

        repo.save_speaker_results(session_id, vec![make("S0")])
            .await
            .unwrap();
        repo.save_speaker_results(session_id, vec![make("S1")])
            .await
            .unwrap();

        let results = repo.results_for(session_id).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].speaker_label, "S1");
    }

    // Pooled at a single connection: "sqlite::memory:" hands out a fresh,
    // separate database per connection, so a multi-connection pool would
    // silently split reads and writes across unrelated databases.
    async fn sqlite_repo() -> SqliteRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repo = SqliteRepository { pool };
        repo.migrate().await.unwrap();
        repo
    }

    #[tokio::test]
    async fn sqlite_double_upsert_yields_one_row_later_non_error_wins() {
        let repo = sqlite_repo().await;
        let session_id = Uuid::new_v4();

        repo.upsert_chunk_transcription(sample_row(session_id, 1, Some("timeout")))
            .await
            .unwrap();
        repo.upsert_chunk_transcription(sample_row(session_id, 1, None))
            .await
            .unwrap();

        let rows = repo.list_chunk_transcriptions(session_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].error.is_none());
    }

    #[tokio::test]
    async fn sqlite_error_does_not_clobber_existing_good_row() {
        let repo = sqlite_repo().await;
        let session_id = Uuid::new_v4();

        repo.upsert_chunk_transcription(sample_row(session_id, 1, None))
            .await
            .unwrap();
        repo.upsert_chunk_transcription(sample_row(session_id, 1, Some("retry failed")))
            .await
            .unwrap();

        let rows = repo.list_chunk_transcriptions(session_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].error.is_none());
    }

    #[tokio::test]
    async fn sqlite_save_speaker_results_replaces_prior_results() {
        let repo = sqlite_repo().await;
        let session_id = Uuid::new_v4();
        let make = |label: &str| SpeakerResult {
            session_id,
            speaker_label: label.to_string(),
            segment_count: 1,
            total_duration: 10.0,
            sample_blob_path: format!("sessions/{session_id}/samples/{label}.wav"),
            sample_start_time: 0.0,
            word_counts: WordCounts::new(),
        };

        repo.save_speaker_results(session_id, vec![make("S0")])
            .await
            .unwrap();
        repo.save_speaker_results(session_id, vec![make("S1")])
            .await
            .unwrap();

        let rows = sqlx::query("SELECT speaker_label FROM speaker_results WHERE session_id = ?")
            .bind(session_id.to_string())
            .fetch_all(&repo.pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String, _>("speaker_label"), "S1");
    }
}
