//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use psyhub_settings::Settings;

/// Upload a file to psyhub storage in resumable chunks.
#[derive(Debug, Parser)]
#[command(name = "psyhub-uploader", version)]
pub struct Args {
    /// File to upload.
    pub file: PathBuf,

    /// Settings file (defaults to the per-user uploader.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Storage API base URL.
    #[arg(long)]
    pub base_url: Option<String>,

    /// Bearer token for the storage API.
    #[arg(long)]
    pub token: Option<String>,

    /// Chunks uploaded in parallel.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Chunk size in bytes.
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// MIME type to send instead of the one guessed from the extension.
    #[arg(long)]
    pub media_type: Option<String>,
}

impl Args {
    /// Overrides file settings with the flags that were given.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(base_url) = &self.base_url {
            settings.api.base_url = base_url.clone();
        }
        if let Some(token) = &self.token {
            settings.api.token = Some(token.clone());
        }
        if let Some(concurrency) = self.concurrency {
            settings.upload.concurrency = concurrency;
        }
        if let Some(chunk_size) = self.chunk_size {
            settings.upload.chunk_size = chunk_size;
        }
    }
}
