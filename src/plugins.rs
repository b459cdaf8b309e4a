// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Plugin naming convention, install directory and discovery.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, SymctlError};

/// Every plugin executable is called `symctl-<name>`.
pub const PLUGIN_PREFIX: &str = "symctl-";

/// Subdirectory of the install directory holding plugin executables.
pub const BIN_DIR: &str = "bin";

/// Executable name for a plugin's short name.
pub fn plugin_program(name: &str) -> String {
    format!("{PLUGIN_PREFIX}{name}")
}

/// Install root for a given executable path: its directory, minus a
/// trailing `bin` segment.
pub fn install_dir_for(executable: &Path) -> PathBuf {
    let dir = executable.parent().unwrap_or_else(|| Path::new("."));
    if dir.file_name().map(|n| n == BIN_DIR).unwrap_or(false) {
        if let Some(parent) = dir.parent() {
            return parent.to_path_buf();
        }
    }
    dir.to_path_buf()
}

/// Install root of the running dispatcher.
pub fn install_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()
        .map_err(|e| SymctlError::fs("failed to locate the running executable", e))?;
    tracing::debug!("Executable path: {}", exe.display());
    Ok(install_dir_for(&exe))
}

/// Short names of the plugins in `<install_dir>/bin`, sorted by file name.
pub fn list_plugins(install_dir: &Path) -> Result<Vec<String>> {
    let bin_dir = install_dir.join(BIN_DIR);
    let entries = fs::read_dir(&bin_dir)
        .map_err(|e| SymctlError::fs(format!("failed to list {}", bin_dir.display()), e))?;

    let mut plugins = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| SymctlError::fs(format!("failed to list {}", bin_dir.display()), e))?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        match name.strip_prefix(PLUGIN_PREFIX) {
            Some(short) if !short.is_empty() => plugins.push(short.to_string()),
            _ => {}
        }
    }

    plugins.sort();
    tracing::debug!("Found {} plugin(s) in {}", plugins.len(), bin_dir.display());
    Ok(plugins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_install_dir_strips_bin() {
        assert_eq!(
            install_dir_for(Path::new("/opt/symctl/bin/symctl")),
            PathBuf::from("/opt/symctl")
        );
        assert_eq!(
            install_dir_for(Path::new("/opt/symctl/symctl")),
            PathBuf::from("/opt/symctl")
        );
        // only an exact `bin` segment is stripped
        assert_eq!(
            install_dir_for(Path::new("/opt/sbin/symctl")),
            PathBuf::from("/opt/sbin")
        );
    }

    #[test]
    fn test_list_plugins_filters_prefix() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).unwrap();
        for name in ["symctl-foo", "symctl-bar", "other-tool", "symctl", "symctl-"] {
            fs::write(bin.join(name), b"").unwrap();
        }

        let mut plugins = list_plugins(dir.path()).unwrap();
        plugins.sort();
        assert_eq!(plugins, vec!["bar".to_string(), "foo".to_string()]);
    }

    #[test]
    fn test_list_plugins_missing_bin_dir() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let err = list_plugins(dir.path()).unwrap_err();
        assert!(matches!(err, SymctlError::Filesystem { .. }));
    }

    #[test]
    fn test_plugin_program() {
        assert_eq!(plugin_program("foo"), "symctl-foo");
    }
}
