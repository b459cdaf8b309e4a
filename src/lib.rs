// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! symctl - plugin dispatcher library
//!
//! symctl finds, installs, upgrades and runs plugins: standalone
//! executables named `symctl-<name>` that live in `<install dir>/bin`.
//!
//! **Catalog** -> **Download** -> **Extract** -> **Merge** -> **Discover** -> **Run**
//!
//! # Core Modules
//!
//! - [`release`] - Release catalog model and platform URL resolution
//! - [`install`] - Download, safe extraction and merge into the install directory
//! - [`plugins`] - Install directory and plugin discovery
//! - [`executor`] - Running a plugin and relaying its output
//! - [`upgrade`] - Atomic self-upgrade from published releases
//! - [`config`] - Settings from file, environment and flags
//! - [`error`] - Error taxonomy and diagnostics

pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod install;
pub mod logging;
pub mod plugins;
pub mod release;
pub mod upgrade;

pub use config::Config;
pub use error::{ErrorBuilder, Result, SymctlError};
pub use executor::Executor;
pub use install::{ArchiveKind, InstallReport, Installer};
pub use plugins::{install_dir, install_dir_for, list_plugins, plugin_program, PLUGIN_PREFIX};
pub use release::{pick_release_url, Platform, Release, Url};
pub use upgrade::{GithubReleaseHost, ReleaseHost, UpgradeOutcome, Upgrader};
