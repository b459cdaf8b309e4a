// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Self-upgrade of the dispatcher binary.
//!
//! The latest published release is compared by name with the running
//! version. When they differ, the asset named
//! `symctl-<release>-<os>-<arch>` is downloaded next to the running
//! executable and renamed over it in a single step, so an interrupted
//! upgrade never leaves a truncated binary behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;

use crate::config::Config;
use crate::error::{Result, SymctlError};
use crate::http;
use crate::install::set_mode;
use crate::plugins::PLUGIN_PREFIX;
use crate::release::Platform;

/// Mode of the freshly downloaded executable.
const EXECUTABLE_MODE: u32 = 0o755;

/// Latest published release as reported by the release host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestRelease {
    pub name: String,
    pub id: u64,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub id: u64,
}

/// Where releases of the dispatcher are published.
pub trait ReleaseHost {
    fn latest_release(&self) -> Result<LatestRelease>;

    fn list_assets(&self, release_id: u64) -> Result<Vec<ReleaseAsset>>;

    /// Stream the asset's bytes into `out`, returning the byte count.
    fn download_asset(&self, asset_id: u64, out: &mut dyn Write) -> Result<u64>;
}

/// Result of an upgrade attempt. None of these are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The latest release is the running version.
    UpToDate { version: String },
    /// A newer release exists but has no build for this platform.
    NoAsset { current: String, latest: String, expected: String },
    /// Dry run: an upgrade would have installed `asset`.
    DryRun { current: String, latest: String, asset: String },
    /// `path` now holds the new release.
    Upgraded { current: String, latest: String, path: PathBuf },
}

/// Asset name for a release on a platform.
pub fn asset_name(release: &str, platform: &Platform) -> String {
    format!("{PLUGIN_PREFIX}{}-{}-{}", release, platform.os, platform.arch)
}

pub struct Upgrader<H> {
    host: H,
    platform: Platform,
    target: Option<PathBuf>,
}

impl<H: ReleaseHost> Upgrader<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            platform: Platform::current(),
            target: None,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Replace `path` instead of the running executable.
    pub fn with_target(mut self, path: impl Into<PathBuf>) -> Self {
        self.target = Some(path.into());
        self
    }

    pub fn upgrade(&self, current_version: &str, dry_run: bool) -> Result<UpgradeOutcome> {
        tracing::debug!("Upgrade called with version: {}, dry-run: {}", current_version, dry_run);

        let latest = self.host.latest_release()?;
        tracing::debug!("Latest release: {} (id {})", latest.name, latest.id);
        if latest.name == current_version {
            return Ok(UpgradeOutcome::UpToDate { version: latest.name });
        }

        tracing::debug!("Platform: {}", self.platform);
        let expected = asset_name(&latest.name, &self.platform);
        let assets = self.host.list_assets(latest.id)?;
        for asset in &assets {
            tracing::debug!("Asset: {}", asset.name);
        }

        // the last matching asset wins when a release lists duplicates
        let Some(asset) = assets.iter().rev().find(|a| a.name == expected) else {
            tracing::debug!("No asset found for {}", expected);
            return Ok(UpgradeOutcome::NoAsset {
                current: current_version.to_string(),
                latest: latest.name,
                expected,
            });
        };
        tracing::debug!("Found asset {} (id {})", asset.name, asset.id);

        if dry_run {
            tracing::debug!("Dry run, skipping upgrade");
            return Ok(UpgradeOutcome::DryRun {
                current: current_version.to_string(),
                latest: latest.name,
                asset: asset.name.clone(),
            });
        }

        let target = self.target_path()?;
        self.replace_executable(asset, &target)?;

        Ok(UpgradeOutcome::Upgraded {
            current: current_version.to_string(),
            latest: latest.name,
            path: target,
        })
    }

    fn target_path(&self) -> Result<PathBuf> {
        match &self.target {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe()
                .map_err(|e| SymctlError::fs("failed to locate the running executable", e)),
        }
    }

    /// Download into a temp file beside `target`, then rename it over
    /// `target`. Staying in the same directory keeps the rename on one
    /// filesystem. The dot prefix keeps the temp file out of plugin listings
    /// when `target` lives in the plugin directory.
    fn replace_executable(&self, asset: &ReleaseAsset, target: &Path) -> Result<()> {
        let dir = target.parent().unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::Builder::new()
            .prefix(".symctl-new-")
            .tempfile_in(dir)
            .map_err(|e| SymctlError::fs(format!("failed to create temp file in {}", dir.display()), e))?;
        tracing::debug!("Temp file: {}", temp.path().display());

        let bytes = self.host.download_asset(asset.id, temp.as_file_mut())?;
        temp.as_file()
            .sync_all()
            .map_err(|e| SymctlError::fs("failed to flush downloaded executable", e))?;
        tracing::debug!("Downloaded {} bytes", bytes);

        set_mode(temp.path(), EXECUTABLE_MODE)?;

        tracing::debug!("Renaming {} to {}", temp.path().display(), target.display());
        temp.persist(target).map_err(|e| {
            SymctlError::fs(format!("failed to replace {}", target.display()), e.error)
        })?;
        Ok(())
    }
}

/// GitHub REST API release host.
#[derive(Debug, Clone)]
pub struct GithubReleaseHost {
    client: Client,
    api_url: String,
    owner: String,
    repo: String,
    token: Option<String>,
    show_progress: bool,
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    id: u64,
    name: Option<String>,
    tag_name: Option<String>,
}

impl GithubReleaseHost {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: http::build_client()?,
            api_url: config.github_api_url.trim_end_matches('/').to_string(),
            owner: config.github_owner.clone(),
            repo: config.github_repo.clone(),
            token: config.github_token.clone(),
            show_progress: config.show_progress,
        })
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_url, self.owner, self.repo, path)
    }

    fn get(&self, url: &str, accept: &str) -> reqwest::blocking::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let response = http::send(self.get(url, "application/vnd.github+json"), what)?;
        let body = response
            .bytes()
            .map_err(|e| SymctlError::network(what, e))?;
        serde_json::from_slice(&body).map_err(|e| SymctlError::decode(what, e))
    }
}

impl ReleaseHost for GithubReleaseHost {
    fn latest_release(&self) -> Result<LatestRelease> {
        let release: GithubRelease =
            self.get_json(&self.repo_url("releases/latest"), "failed to fetch latest release")?;
        let name = release
            .name
            .filter(|n| !n.is_empty())
            .or(release.tag_name)
            .ok_or_else(|| SymctlError::Resolution("latest release has no name".to_string()))?;
        Ok(LatestRelease { name, id: release.id })
    }

    fn list_assets(&self, release_id: u64) -> Result<Vec<ReleaseAsset>> {
        let url = self.repo_url(&format!("releases/{}/assets?per_page=100", release_id));
        self.get_json(&url, "failed to list release assets")
    }

    fn download_asset(&self, asset_id: u64, out: &mut dyn Write) -> Result<u64> {
        let url = self.repo_url(&format!("releases/assets/{}", asset_id));
        let response = http::send(
            self.get(&url, "application/octet-stream"),
            "failed to download release asset",
        )?;
        tracing::debug!("Asset served from {}", response.url());
        http::copy_body(response, out, self.show_progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::fs;
    use tempfile::TempDir;

    struct FakeHost {
        latest: &'static str,
        assets: Vec<&'static str>,
        payload: &'static [u8],
        asset_lists: Cell<usize>,
        downloads: Cell<usize>,
    }

    impl FakeHost {
        fn new(latest: &'static str, assets: Vec<&'static str>) -> Self {
            Self {
                latest,
                assets,
                payload: b"new-binary",
                asset_lists: Cell::new(0),
                downloads: Cell::new(0),
            }
        }
    }

    impl ReleaseHost for &FakeHost {
        fn latest_release(&self) -> Result<LatestRelease> {
            Ok(LatestRelease { name: self.latest.to_string(), id: 7 })
        }

        fn list_assets(&self, release_id: u64) -> Result<Vec<ReleaseAsset>> {
            assert_eq!(release_id, 7);
            self.asset_lists.set(self.asset_lists.get() + 1);
            Ok(self
                .assets
                .iter()
                .enumerate()
                .map(|(i, name)| ReleaseAsset { name: name.to_string(), id: 100 + i as u64 })
                .collect())
        }

        fn download_asset(&self, _asset_id: u64, out: &mut dyn Write) -> Result<u64> {
            self.downloads.set(self.downloads.get() + 1);
            out.write_all(self.payload)
                .map_err(|e| SymctlError::fs("fake write", e))?;
            Ok(self.payload.len() as u64)
        }
    }

    fn linux() -> Platform {
        Platform::new("linux", "amd64")
    }

    fn target_in(dir: &TempDir) -> PathBuf {
        let target = dir.path().join("symctl");
        fs::write(&target, b"old-binary").unwrap();
        target
    }

    fn dir_entries(dir: &TempDir) -> usize {
        fs::read_dir(dir.path()).unwrap().count()
    }

    #[test]
    fn test_asset_name() {
        assert_eq!(asset_name("1.1.0", &linux()), "symctl-1.1.0-linux-amd64");
    }

    #[test]
    fn test_up_to_date_skips_everything() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let target = target_in(&dir);
        let host = FakeHost::new("1.0.0", vec!["symctl-1.0.0-linux-amd64"]);
        let upgrader = Upgrader::new(&host).with_platform(linux()).with_target(&target);

        let outcome = upgrader.upgrade("1.0.0", false).unwrap();
        assert_eq!(outcome, UpgradeOutcome::UpToDate { version: "1.0.0".into() });
        assert_eq!(host.asset_lists.get(), 0);
        assert_eq!(host.downloads.get(), 0);
        assert_eq!(fs::read(&target).unwrap(), b"old-binary");
    }

    #[test]
    fn test_dry_run_is_idempotent() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let target = target_in(&dir);
        let host = FakeHost::new("1.1.0", vec!["symctl-1.1.0-linux-amd64"]);
        let upgrader = Upgrader::new(&host).with_platform(linux()).with_target(&target);

        let first = upgrader.upgrade("1.0.0", true).unwrap();
        let second = upgrader.upgrade("1.0.0", true).unwrap();
        assert_eq!(first, second);
        assert!(matches!(first, UpgradeOutcome::DryRun { ref asset, .. } if asset == "symctl-1.1.0-linux-amd64"));
        assert_eq!(host.downloads.get(), 0);
        assert_eq!(fs::read(&target).unwrap(), b"old-binary");
        assert_eq!(dir_entries(&dir), 1);
    }

    #[test]
    fn test_missing_asset_is_soft_failure() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let target = target_in(&dir);
        let host = FakeHost::new("1.1.0", vec!["symctl-1.1.0-darwin-arm64"]);
        let upgrader = Upgrader::new(&host).with_platform(linux()).with_target(&target);

        let outcome = upgrader.upgrade("1.0.0", false).unwrap();
        assert_eq!(
            outcome,
            UpgradeOutcome::NoAsset {
                current: "1.0.0".into(),
                latest: "1.1.0".into(),
                expected: "symctl-1.1.0-linux-amd64".into(),
            }
        );
        assert_eq!(host.downloads.get(), 0);
        assert_eq!(fs::read(&target).unwrap(), b"old-binary");
    }

    #[cfg(unix)]
    #[test]
    fn test_upgrade_replaces_target() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("Failed to create temp dir");
        let target = target_in(&dir);
        let host = FakeHost::new(
            "1.1.0",
            vec!["symctl-1.1.0-darwin-arm64", "symctl-1.1.0-linux-amd64", "checksums.txt"],
        );
        let upgrader = Upgrader::new(&host).with_platform(linux()).with_target(&target);

        let outcome = upgrader.upgrade("1.0.0", false).unwrap();
        assert_eq!(
            outcome,
            UpgradeOutcome::Upgraded {
                current: "1.0.0".into(),
                latest: "1.1.0".into(),
                path: target.clone(),
            }
        );
        assert_eq!(host.downloads.get(), 1);
        assert_eq!(fs::read(&target).unwrap(), b"new-binary");
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        // no temp file left behind
        assert_eq!(dir_entries(&dir), 1);
    }

    #[test]
    fn test_rename_failure_is_filesystem_error() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        // a non-empty directory cannot be replaced by a file rename
        let target = dir.path().join("occupied");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), b"x").unwrap();
        let host = FakeHost::new("1.1.0", vec!["symctl-1.1.0-linux-amd64"]);
        let upgrader = Upgrader::new(&host).with_platform(linux()).with_target(&target);

        let err = upgrader.upgrade("1.0.0", false).unwrap_err();
        assert!(matches!(err, SymctlError::Filesystem { .. }));
        assert!(target.join("keep").exists());
        // the temp file was cleaned up
        assert_eq!(dir_entries(&dir), 1);
    }

    /// Host that records which plugins are visible while the asset streams.
    struct ListingHost {
        install_dir: PathBuf,
        seen: std::cell::RefCell<Vec<String>>,
    }

    impl ReleaseHost for &ListingHost {
        fn latest_release(&self) -> Result<LatestRelease> {
            Ok(LatestRelease { name: "1.1.0".to_string(), id: 7 })
        }

        fn list_assets(&self, _release_id: u64) -> Result<Vec<ReleaseAsset>> {
            Ok(vec![ReleaseAsset { name: "symctl-1.1.0-linux-amd64".to_string(), id: 1 }])
        }

        fn download_asset(&self, _asset_id: u64, out: &mut dyn Write) -> Result<u64> {
            out.write_all(b"new").map_err(|e| SymctlError::fs("fake write", e))?;
            *self.seen.borrow_mut() = crate::plugins::list_plugins(&self.install_dir)?;
            Ok(3)
        }
    }

    #[test]
    fn test_temp_file_is_not_listed_as_plugin() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        fs::write(bin.join("symctl-foo"), b"foo").unwrap();
        let target = bin.join("symctl");
        fs::write(&target, b"old").unwrap();

        let host = ListingHost {
            install_dir: dir.path().to_path_buf(),
            seen: Default::default(),
        };
        let upgrader = Upgrader::new(&host).with_platform(linux()).with_target(&target);

        upgrader.upgrade("1.0.0", false).unwrap();
        assert_eq!(*host.seen.borrow(), vec!["foo".to_string()]);
        assert_eq!(fs::read(&target).unwrap(), b"new");
    }
}
