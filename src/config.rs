// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Runtime settings.
//!
//! Settings are layered: built-in defaults, then `~/.symctl/config.json` if
//! present, then environment variables, then CLI flags (applied by the
//! binary). The resulting [`Config`] is passed explicitly to whatever needs
//! it; nothing here is global.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable enabling verbose diagnostics.
pub const DEBUG_ENV: &str = "SYMCTL_DEBUG";

/// Environment variable holding a release API token.
pub const TOKEN_ENV: &str = "SYMCTL_GITHUB_TOKEN";

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GITHUB_OWNER: &str = "SymmetricalAI";
pub const DEFAULT_GITHUB_REPO: &str = "symctl";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Emit debug-level diagnostics on stderr.
    pub verbose: bool,
    /// Base URL of the release-hosting API used by `upgrade`.
    pub github_api_url: String,
    pub github_owner: String,
    pub github_repo: String,
    /// Optional API token.
    pub github_token: Option<String>,
    /// Draw progress bars for downloads when stderr is a terminal.
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbose: false,
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            github_owner: DEFAULT_GITHUB_OWNER.to_string(),
            github_repo: DEFAULT_GITHUB_REPO.to_string(),
            github_token: None,
            show_progress: true,
        }
    }
}

impl Config {
    /// Location of the optional config file.
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".symctl").join("config.json"))
    }

    /// Load defaults, the config file and the environment.
    pub fn load() -> Result<Self> {
        let config = match Self::path() {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            _ => Config::default(),
        };
        Ok(config.with_env(|key| std::env::var(key).ok()))
    }

    /// Apply environment overrides read through `lookup`.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(DEBUG_ENV) {
            if is_truthy(&value) {
                self.verbose = true;
            }
        }
        if let Some(token) = lookup(TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.github_token = Some(token.trim().to_string());
            }
        }
        self
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
