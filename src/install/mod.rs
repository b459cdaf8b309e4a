// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Plugin installation from a release catalog.
//!
//! ```text
//! catalog URL ──GET──▶ [Release] ──resolve──▶ asset URL
//!                                                │
//!                                   download into staging dir
//!                                                │
//!                              extract into staging/unarchived
//!                                                │
//!                        lock + merge into the install directory
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use symctl::{Config, Installer};
//!
//! # fn example() -> symctl::Result<()> {
//! let installer = Installer::new(&Config::default())?;
//! let report = installer.install("https://example.com/plugins/tools.json")?;
//! println!("installed into {}", report.install_dir.display());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod lock;
pub mod merge;

use std::ffi::OsStr;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;

use crate::config::Config;
use crate::error::{Result, SymctlError};
use crate::http;
use crate::plugins;
use crate::release::{self, Platform, Release};

pub use archive::ArchiveKind;
pub use lock::InstallLock;

/// Name of the extraction directory inside the staging area.
pub const UNARCHIVED_DIR: &str = "unarchived";

/// What an install did.
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Asset URL picked from the catalog.
    pub url: String,
    /// How the asset was unpacked.
    pub kind: ArchiveKind,
    pub install_dir: PathBuf,
    /// Files copied into the install directory.
    pub files: usize,
    /// Plugins present in the install directory afterwards.
    pub plugins: Vec<String>,
}

/// Downloads catalog assets and merges them into the install directory.
#[derive(Debug, Clone)]
pub struct Installer {
    client: Client,
    platform: Platform,
    install_dir: Option<PathBuf>,
    show_progress: bool,
    lock_timeout: Duration,
}

impl Installer {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: http::build_client()?,
            platform: Platform::current(),
            install_dir: None,
            show_progress: config.show_progress,
            lock_timeout: lock::LOCK_TIMEOUT,
        })
    }

    /// Resolve assets for `platform` instead of the running one.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Install into `dir` instead of the dispatcher's own install directory.
    pub fn with_install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = Some(dir.into());
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Install the newest release listed in the catalog at `address`.
    pub fn install(&self, address: &str) -> Result<InstallReport> {
        tracing::debug!("Installing plugin from {}", address);

        let releases = self.fetch_releases(address)?;
        tracing::debug!("Catalog lists {} release(s)", releases.len());

        let url = release::pick_release_url(&releases, &self.platform)?.url.clone();
        tracing::debug!("Downloading from {}", url);

        let staging = tempfile::Builder::new()
            .prefix("symctl-")
            .tempdir()
            .map_err(|e| SymctlError::fs("failed to create staging directory", e))?;
        tracing::debug!("Staging directory: {}", staging.path().display());

        // Redirects often land on extension-less blob paths, so the archive
        // kind and bare executable name come from the catalog URL.
        let name = asset_name(&url)?;
        let kind = ArchiveKind::detect(Path::new(&name));

        let downloaded = self.download(&url, staging.path())?;
        tracing::debug!("Downloaded file to {}", downloaded.display());

        let unarchived = staging.path().join(UNARCHIVED_DIR);
        create_dir_with_mode(&unarchived, Some(0o755))?;
        archive::extract_as(kind, &downloaded, OsStr::new(&name), &unarchived)?;

        let install_dir = match &self.install_dir {
            Some(dir) => dir.clone(),
            None => plugins::install_dir()?,
        };
        create_dir_with_mode(&install_dir, None)?;

        let files = {
            let _lock = InstallLock::acquire(&install_dir, self.lock_timeout)?;
            merge::merge_tree(&unarchived, &install_dir)?
        };
        tracing::debug!("Installed to {}", install_dir.display());

        let plugins = plugins::list_plugins(&install_dir).unwrap_or_default();

        Ok(InstallReport {
            url,
            kind,
            install_dir,
            files,
            plugins,
        })
    }

    /// GET and decode the release catalog.
    pub fn fetch_releases(&self, address: &str) -> Result<Vec<Release>> {
        http::get_json(&self.client, address, &format!("failed to fetch catalog {}", address))
    }

    /// Download `url` into `dir`, naming the file after the URL's last path
    /// segment (after redirects).
    pub fn download(&self, url: &str, dir: &Path) -> Result<PathBuf> {
        let what = format!("failed to download {}", url);
        let response = http::send(self.client.get(url), &what)?;

        let path = dir.join(http::url_basename(response.url()));
        let mut out = File::create(&path)
            .map_err(|e| SymctlError::fs(format!("failed to create {}", path.display()), e))?;
        let bytes = http::copy_body(response, &mut out, self.show_progress)?;
        tracing::debug!("Wrote {} bytes to {}", bytes, path.display());
        Ok(path)
    }
}

/// Last path segment of a catalog download URL, without query or fragment.
fn asset_name(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| SymctlError::Resolution(format!("invalid download URL {}: {}", url, e)))?;
    Ok(http::url_basename(&parsed))
}

/// Create `path` and its parents. A mode, when given, is applied only if
/// the directory did not exist before.
pub(crate) fn create_dir_with_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path)
        .map_err(|e| SymctlError::fs(format!("failed to create {}", path.display()), e))?;
    match mode {
        Some(mode) => set_mode(path, mode),
        None => Ok(()),
    }
}

/// Set permission bits. No-op where the platform has no Unix modes.
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
            .map_err(|e| SymctlError::fs(format!("failed to chmod {}", path.display()), e))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

/// Permission bits of `path` (0o644 where the platform has no Unix modes).
pub(crate) fn mode_of(path: &Path) -> Result<u32> {
    let metadata = fs::metadata(path)
        .map_err(|e| SymctlError::fs(format!("failed to stat {}", path.display()), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Ok(metadata.permissions().mode() & 0o7777)
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
        Ok(0o644)
    }
}
