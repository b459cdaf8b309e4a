// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Advisory lock serialising merges into one install directory.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Result, SymctlError};

/// Lock file name inside the install directory.
pub const LOCK_FILE: &str = ".symctl.lock";

/// Default timeout for acquiring the install lock (5 seconds)
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Retry interval when waiting for lock acquisition
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Held exclusive lock; released on drop.
#[derive(Debug)]
pub struct InstallLock {
    file: File,
    path: PathBuf,
}

impl InstallLock {
    /// Take the exclusive lock on `install_dir`, waiting up to `timeout`.
    pub fn acquire(install_dir: &Path, timeout: Duration) -> Result<Self> {
        let path = install_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| SymctlError::fs(format!("failed to open lock file {}", path.display()), e))?;

        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!("Acquired install lock {}", path.display());
                    return Ok(Self { file, path });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock
                    || e.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
                {
                    if start.elapsed() >= timeout {
                        return Err(SymctlError::fs(
                            format!(
                                "timed out after {:?} waiting for {}; another install may be running",
                                timeout,
                                path.display()
                            ),
                            e,
                        ));
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => {
                    return Err(SymctlError::fs(
                        format!("failed to lock {}", path.display()),
                        e,
                    ));
                }
            }
        }
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release install lock {}: {}", self.path.display(), e);
        }
    }
}
