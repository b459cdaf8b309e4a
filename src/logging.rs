// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Diagnostic output setup.

use tracing::Level;

use crate::config::Config;

/// Level used for a given config: debug when verbose, warnings otherwise.
pub fn level_for(config: &Config) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    }
}

/// Install the stderr subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(config: &Config) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level_for(config))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
