use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::error::{FetchError, ProgressError, TransportError};
use crate::progress::{ProgressStore, SequenceNumber};
use crate::utils::{archive_file_name, archive_url, partial_path, BASE_URL};

pub const DEFAULT_OUTPUT_DIR: &str = "downloads";
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub const fn from_secs(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_secs(min),
            max: Duration::from_secs(max),
        }
    }
}

pub struct FetchConfig {
    pub base_url: String,
    pub output_dir: PathBuf,
    pub max_attempts: u32,
    /// Wait between two attempts on the same archive.
    pub retry_delay: DelayRange,
    /// Wait between two successfully downloaded archives.
    pub pause: DelayRange,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_attempts: MAX_ATTEMPTS,
            retry_delay: DelayRange::from_secs(5, 10),
            pause: DelayRange::from_secs(3, 7),
        }
    }
}

/// Moves one remote archive into one local file.
#[async_trait]
pub trait Transport {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), TransportError>;
}

#[async_trait]
pub trait Sleeper {
    async fn sleep(&self, duration: Duration);
}

pub trait DelayPicker {
    fn pick(&self, range: &DelayRange) -> Duration;
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Uniformly distributed over the whole range, bounds included.
pub struct UniformDelay;

impl DelayPicker for UniformDelay {
    fn pick(&self, range: &DelayRange) -> Duration {
        if range.max <= range.min {
            return range.min;
        }
        let secs = rand::thread_rng().gen_range(range.min.as_secs_f64()..=range.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

#[derive(Debug)]
pub enum DownloadOutcome {
    Downloaded { attempts: u32 },
    Exhausted { attempts: u32, last_error: TransportError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndReached,
    /// Every attempt on `number` failed; taken to mean the series ends before it.
    SeriesExhausted { number: SequenceNumber },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub first: SequenceNumber,
    pub downloaded: u64,
    pub last_success: Option<SequenceNumber>,
    pub reason: StopReason,
}

/// `Ok(None)` when the recorded number is the largest one representable,
/// so there is nothing left to fetch.
pub fn resolve_start<S: ProgressStore>(
    start: Option<SequenceNumber>,
    store: &S,
) -> Result<Option<SequenceNumber>, FetchError> {
    if let Some(start) = start {
        return Ok(Some(start));
    }

    match store.read() {
        Ok(last) => {
            let start = last.checked_add(1);
            match start {
                Some(start) => {
                    log::info!("Starting from number {} (based on last downloaded)", start)
                }
                None => log::warn!("Last downloaded number {} cannot be advanced", last),
            }
            Ok(start)
        }
        Err(ProgressError::Missing(_)) => Err(FetchError::NoStartingPoint),
        Err(err) => Err(FetchError::StateRead(err)),
    }
}

pub struct FetchLoop<T, S, P, D> {
    config: FetchConfig,
    transport: T,
    store: S,
    sleeper: P,
    delays: D,
}

impl<T, S, P, D> FetchLoop<T, S, P, D>
where
    T: Transport,
    S: ProgressStore,
    P: Sleeper,
    D: DelayPicker,
{
    pub fn new(config: FetchConfig, transport: T, store: S, sleeper: P, delays: D) -> Self {
        Self {
            config,
            transport,
            store,
            sleeper,
            delays,
        }
    }

    /// Downloads archives from `start` (or one past the recorded progress)
    /// until `end` is passed or an archive cannot be fetched.
    pub async fn run(
        &mut self,
        start: Option<SequenceNumber>,
        end: Option<SequenceNumber>,
    ) -> Result<RunSummary, FetchError> {
        let Some(first) = resolve_start(start, &self.store)? else {
            return Ok(RunSummary {
                first: SequenceNumber::MAX,
                downloaded: 0,
                last_success: self.last_success(),
                reason: StopReason::EndReached,
            });
        };
        let mut current = first;
        let mut downloaded = 0;

        let reason = loop {
            if end.is_some_and(|end| current > end) {
                log::info!("Reached specified end number. Stopping.");
                break StopReason::EndReached;
            }

            let file_name = archive_file_name(current);
            let url = archive_url(&self.config.base_url, current);
            let destination = self.config.output_dir.join(&file_name);

            log::info!("Attempting to download {}...", url);

            match self.retrying_download(&url, &destination).await {
                DownloadOutcome::Downloaded { attempts } => {
                    self.store.write(current).map_err(FetchError::StateWrite)?;
                    downloaded += 1;
                    log::info!("Successfully downloaded {}", file_name);
                    log::debug!("{} took {} attempt(s)", file_name, attempts);
                }
                DownloadOutcome::Exhausted {
                    attempts,
                    last_error,
                } => {
                    // Any error ends the run, not only 404. A long enough
                    // outage looks the same as the end of the series.
                    if !last_error.is_not_found() {
                        log::warn!("Last failure on {} was not a 404: {}", file_name, last_error);
                    }
                    let part = partial_path(&destination);
                    match tokio::fs::remove_file(&part).await {
                        Ok(()) => log::debug!("Removed incomplete {}", part.display()),
                        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                        Err(err) => log::warn!("Failed to remove {}: {}", part.display(), err),
                    }
                    log::warn!(
                        "Failed to download {} after {} attempts. This is likely the end of available files.",
                        file_name,
                        attempts
                    );
                    break StopReason::SeriesExhausted { number: current };
                }
            }

            let Some(next) = current.checked_add(1) else {
                break StopReason::EndReached;
            };
            if end.map_or(true, |end| next <= end) {
                let wait = self.delays.pick(&self.config.pause);
                log::info!(
                    "Waiting for {:.2} seconds before next download...",
                    wait.as_secs_f64()
                );
                self.sleeper.sleep(wait).await;
            }
            current = next;
        };

        Ok(RunSummary {
            first,
            downloaded,
            last_success: self.last_success(),
            reason,
        })
    }

    fn last_success(&self) -> Option<SequenceNumber> {
        match self.store.read() {
            Ok(last) => Some(last),
            Err(ProgressError::Missing(_)) => None,
            Err(err) => {
                log::warn!("Could not read back recorded progress: {}", err);
                None
            }
        }
    }

    /// Tries `url` up to `max_attempts` times, each attempt rewriting
    /// `destination` from scratch.
    pub async fn retrying_download(&self, url: &str, destination: &Path) -> DownloadOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match self.transport.fetch(url, destination).await {
                Ok(()) => return DownloadOutcome::Downloaded { attempts: attempt },
                Err(err) => err,
            };

            if attempt >= max_attempts {
                log::error!(
                    "Error downloading after {} attempts: {}",
                    max_attempts,
                    err
                );
                return DownloadOutcome::Exhausted {
                    attempts: attempt,
                    last_error: err,
                };
            }

            let wait = self.delays.pick(&self.config.retry_delay);
            log::warn!(
                "Attempt {} failed ({}). Retrying in {:.2} seconds...",
                attempt,
                err,
                wait.as_secs_f64()
            );
            self.sleeper.sleep(wait).await;
            attempt += 1;
        }
    }
}
