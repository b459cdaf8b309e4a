// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Recursive merge of a staged tree into the install directory.
//!
//! Existing files are overwritten, existing directories are left alone
//! (including their modes). Directories the merge creates get their source
//! mode only after the walk, so a read-only directory can still be filled. The merge is not transactional: a failure part
//! way leaves the destination with a mix of old and new files.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use super::{create_dir_with_mode, mode_of, set_mode};
use crate::error::{Result, SymctlError};

/// Copy every directory and regular file under `src` into `dst`.
/// Returns the number of files copied.
pub fn merge_tree(src: &Path, dst: &Path) -> Result<usize> {
    let mut copied = 0;
    let mut created_dirs = Vec::new();

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(|e| {
            let context = format!("failed to walk {}", src.display());
            SymctlError::fs(context, e.into())
        })?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| SymctlError::Security { path: entry.path().to_path_buf() })?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if !target.is_dir() {
                create_dir_with_mode(&target, None)?;
                created_dirs.push((target, mode_of(entry.path())?));
            }
        } else if file_type.is_file() {
            copy_file(entry.path(), &target)?;
            copied += 1;
        } else {
            tracing::debug!("Skipping non-regular file {}", entry.path().display());
        }
    }

    // walk order is parent first, so reversing applies the deepest first
    for (dir, mode) in created_dirs.into_iter().rev() {
        set_mode(&dir, mode)?;
    }

    tracing::debug!("Merged {} file(s) into {}", copied, dst.display());
    Ok(copied)
}

/// Overwrite `dst` with the contents of `src` and give it `src`'s mode.
fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst).map_err(|e| {
        SymctlError::fs(format!("failed to copy {} to {}", src.display(), dst.display()), e)
    })?;
    set_mode(dst, mode_of(src)?)
}
