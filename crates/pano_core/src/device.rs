//! Waiting for the capture device to be mounted.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::orchestrator::CancelHandle;

/// Granularity of cancellation checks while sleeping.
const CANCEL_CHECK: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Device not mounted at {} after {:?}", path.display(), after)]
    TimedOut { path: PathBuf, after: Duration },

    #[error("Cancelled while waiting for {}", path.display())]
    Cancelled { path: PathBuf },
}

/// True when `path` is a directory with at least one entry.
///
/// An empty mount point directory counts as not mounted.
pub fn is_mounted(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Block until `path` is mounted.
///
/// Polls every `poll` until the mount appears, `timeout` elapses (`None`
/// waits forever) or the run is cancelled.
pub fn wait_for_mount(
    path: &Path,
    poll: Duration,
    timeout: Option<Duration>,
    cancel: &CancelHandle,
) -> Result<(), DeviceError> {
    let start = Instant::now();
    let mut announced = false;

    loop {
        if is_mounted(path) {
            if announced {
                tracing::info!("Device mounted at {}", path.display());
            }
            return Ok(());
        }

        if !announced {
            tracing::info!("Waiting for device at {}...", path.display());
            announced = true;
        }

        let mut next_poll = Instant::now() + poll;
        if let Some(limit) = timeout {
            let end = start + limit;
            if Instant::now() >= end {
                return Err(DeviceError::TimedOut {
                    path: path.to_path_buf(),
                    after: limit,
                });
            }
            next_poll = next_poll.min(end);
        }

        while Instant::now() < next_poll {
            if cancel.is_cancelled() {
                return Err(DeviceError::Cancelled {
                    path: path.to_path_buf(),
                });
            }
            thread::sleep(CANCEL_CHECK.min(next_poll.saturating_duration_since(Instant::now())));
        }
    }
}
