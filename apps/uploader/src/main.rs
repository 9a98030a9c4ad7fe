//! psyhub chunked uploader entry point.

mod app;
mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use psyhub_settings::Settings;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    args.apply(&mut settings);
    tracing::info!(
        base_url = %settings.api.base_url,
        concurrency = settings.upload.concurrency,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    let url = rt.block_on(app::run(&args, &settings))?;

    println!("{url}");
    Ok(())
}
