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

//! Development/ops CLI harness: drives one session end-to-end against a
//! sqlite `Repository` and a filesystem `BlobStore`. Grounded on the
//! assistant's `src/bin/process_audio.rs` one-shot binary shape; this is
//! not the out-of-scope HTTP/RPC surface (spec.md §1), just a way to run
//! the core outside of it.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use voiceclaim_core::blobstore::FsBlobStore;
use voiceclaim_core::diarizer::SpectralDiarizer;
use voiceclaim_core::repository::SqliteRepository;
use voiceclaim_core::transcriber::OpenAiWhisperTranscriber;
use voiceclaim_core::{Config, Processor};

#[derive(Parser, Debug)]
#[command(name = "process-session", about = "Run the voice pipeline core for one session")]
struct Args {
    /// Session id to process (must already exist in the sqlite database with its chunks).
    #[arg(long)]
    session_id: Uuid,

    /// Sqlite database URL, e.g. sqlite://sessions.db
    #[arg(long, default_value = "sqlite://sessions.db")]
    database_url: String,

    /// Root directory for blob storage.
    #[arg(long, default_value = "./blobs")]
    blob_root: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::load().await.context("failed to load configuration")?;

    let repository = Arc::new(
        SqliteRepository::connect(&args.database_url)
            .await
            .context("failed to connect to sqlite repository")?,
    );
    let blob_store = Arc::new(FsBlobStore::new(args.blob_root.clone().into()));
    let diarizer = Arc::new(SpectralDiarizer::new(
        Default::default(),
        config.credentials.diarizer_token.clone(),
    ));
    let transcriber = Arc::new(OpenAiWhisperTranscriber::new(config.credentials.transcriber_token.clone()));

    let processor = Processor::new(blob_store, repository, diarizer, transcriber, config);

    tracing::info!(session_id = %args.session_id, "starting session processing");
    processor.run(args.session_id, CancellationToken::new()).await?;
    tracing::info!(session_id = %args.session_id, "session ready for claiming");

    Ok(())
}
