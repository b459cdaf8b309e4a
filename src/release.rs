// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Release catalog model and download URL resolution.
//!
//! A catalog is a JSON array of [`Release`] records. Resolution picks the
//! newest release, then the URL built for the running [`Platform`], falling
//! back to a platform-independent (`any`/`any`) entry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SymctlError};

/// Wildcard value for both `platform` and `os` in a catalog URL entry.
pub const ANY: &str = "any";

/// One published version of a plugin bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub binary_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub urls: Vec<Url>,
    pub created: DateTime<Utc>,
}

/// A download location for one architecture/OS pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Url {
    /// CPU architecture, e.g. `amd64`, or `any`.
    pub platform: String,
    /// Operating system, e.g. `linux`, or `any`.
    pub os: String,
    pub url: String,
}

impl Url {
    fn matches(&self, platform: &Platform) -> bool {
        self.platform == platform.arch && self.os == platform.os
    }
}

/// Operating system and architecture, spelled the way catalogs and release
/// assets spell them (`linux`/`darwin`/`windows`, `amd64`/`arm64`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The `any`/`any` wildcard.
    pub fn any() -> Self {
        Self::new(ANY, ANY)
    }

    /// Platform of the running process.
    pub fn current() -> Self {
        Self::new(
            os_name(std::env::consts::OS),
            arch_name(std::env::consts::ARCH),
        )
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Map a Rust target OS name to catalog naming.
pub fn os_name(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

/// Map a Rust target architecture name to catalog naming.
pub fn arch_name(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64",
        other => other,
    }
}

/// Newest release by `created`. Equal timestamps keep the earlier entry.
pub fn latest_release(releases: &[Release]) -> Option<&Release> {
    let mut picked = releases.first()?;
    for release in releases {
        if release.created > picked.created {
            picked = release;
        }
    }
    Some(picked)
}

/// Choose the download URL for `platform` from the newest release.
pub fn pick_release_url<'a>(releases: &'a [Release], platform: &Platform) -> Result<&'a Url> {
    let release = latest_release(releases)
        .ok_or_else(|| SymctlError::Resolution("no releases found".to_string()))?;

    tracing::debug!(
        "Picked release {} {} (created {})",
        release.name,
        release.version,
        release.created
    );
    tracing::debug!("Platform: {}", platform);

    let any = Platform::any();
    release
        .urls
        .iter()
        .find(|url| url.matches(platform))
        .or_else(|| release.urls.iter().find(|url| url.matches(&any)))
        .ok_or_else(|| SymctlError::Resolution("no suitable URL found".to_string()))
}
