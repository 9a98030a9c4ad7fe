//! Wires settings, the HTTP backend and the upload manager together.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use psyhub_settings::Settings;
use psyhub_storage_client::HttpStorageBackend;
use psyhub_transfer::SourceFile;
use psyhub_upload::{UploadError, UploadEvent, UploadManager};

use crate::cli::Args;

/// Uploads `args.file` and returns the merged asset URL.
///
/// Ctrl-C cancels the session; the upload then ends with an error.
pub async fn run(args: &Args, settings: &Settings) -> anyhow::Result<String> {
    let backend = HttpStorageBackend::new(settings.client_config())?;
    let manager = UploadManager::new(Arc::new(backend), settings.upload_options());
    let mut events = manager
        .take_events()
        .await
        .context("event receiver already taken")?;

    let mut source = SourceFile::open(&args.file)
        .with_context(|| format!("cannot read {}", args.file.display()))?;
    if let Some(media_type) = &args.media_type {
        source = source.with_media_type(media_type.clone());
    }

    let upload = manager.upload_file(source);
    tokio::pin!(upload);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    let result = loop {
        tokio::select! {
            result = &mut upload => break result,
            Some(event) = events.recv() => log_event(&event),
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::warn!("interrupt received, cancelling upload");
                manager.cancel();
            }
        }
    };
    drain(&mut events);

    match result {
        Ok(url) => Ok(url),
        Err(UploadError::Cancelled) => anyhow::bail!("upload cancelled"),
        Err(e) => Err(e).context("upload failed"),
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<UploadEvent>) {
    while let Ok(event) = events.try_recv() {
        log_event(&event);
    }
}

fn log_event(event: &UploadEvent) {
    match event {
        UploadEvent::FileSelected {
            filename,
            total_size,
            total_chunks,
            ..
        } => {
            tracing::info!(
                file = %filename,
                size = total_size,
                chunks = total_chunks,
                "starting upload"
            );
        }
        UploadEvent::Progress {
            progress,
            uploaded_chunks,
            total_chunks,
            bytes_per_second,
            ..
        } => {
            tracing::info!(
                "{progress:>3}% ({uploaded_chunks}/{total_chunks} chunks, {})",
                format_rate(*bytes_per_second)
            );
        }
        UploadEvent::Paused { .. } => tracing::info!("paused"),
        UploadEvent::Resumed { .. } => tracing::info!("resumed"),
        UploadEvent::Completed { url, .. } => tracing::info!(url = %url, "upload complete"),
        UploadEvent::Failed { error, .. } => tracing::error!(error = %error, "upload failed"),
        UploadEvent::Cancelled { .. } => tracing::warn!("upload cancelled"),
    }
}

fn format_rate(bytes_per_second: f64) -> String {
    const UNITS: [&str; 4] = ["B/s", "KiB/s", "MiB/s", "GiB/s"];
    let mut value = bytes_per_second.max(0.0);
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
