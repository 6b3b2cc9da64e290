use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

use crate::downloader::{
    FetchConfig, FetchLoop, StopReason, TokioSleeper, UniformDelay, DEFAULT_OUTPUT_DIR,
};
use crate::progress::{FileProgressStore, DEFAULT_STATE_FILE};
use crate::utils::{ensure_output_dir, HttpTransport};

mod downloader;
mod error;
mod progress;
mod utils;

/// Download chess game archives from The Week in Chess (TWIC).
#[derive(Parser)]
#[command(version, about)]
struct Args {
    #[clap(short, long, help = "Starting TWIC number")]
    start: Option<u64>,
    #[clap(short, long, help = "Ending TWIC number (inclusive)")]
    end: Option<u64>,
    #[clap(long, default_value = DEFAULT_OUTPUT_DIR, help = "Directory for downloaded archives")]
    output_dir: PathBuf,
    #[clap(long, default_value = DEFAULT_STATE_FILE, help = "File recording the last downloaded number")]
    state_file: PathBuf,
    #[clap(long, help = "Enable debug mode")]
    debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::builder().filter_level(log_level).init();

    if let Err(err) = run(args).await {
        log::error!("Error: {:#}", err);
        process::exit(1);
    }

    Ok(())
}

async fn run(args: Args) -> Result<()> {
    ensure_output_dir(&args.output_dir).await?;

    let config = FetchConfig {
        output_dir: args.output_dir,
        ..FetchConfig::default()
    };
    let store = FileProgressStore::new(args.state_file);
    log::debug!("Tracking progress in {}", store.path().display());

    let mut fetcher = FetchLoop::new(
        config,
        HttpTransport::new()?,
        store,
        TokioSleeper,
        UniformDelay,
    );
    let summary = fetcher.run(args.start, args.end).await?;

    if let StopReason::SeriesExhausted { number } = summary.reason {
        log::debug!("Stopped at {} after starting from {}", number, summary.first);
    }
    log::info!("Downloaded {} archive(s) this run", summary.downloaded);
    match summary.last_success {
        Some(last) => log::info!("Download complete. Last successful download: {}", last),
        None => log::info!("Download complete. Nothing has been downloaded yet."),
    }

    Ok(())
}
