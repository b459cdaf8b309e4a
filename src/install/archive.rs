// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Archive extraction with path-traversal protection.
//!
//! Every entry name is resolved lexically against the destination before
//! anything is written. An entry that would land outside the destination
//! aborts the whole extraction with [`SymctlError::Security`].

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use zip::ZipArchive;

use super::{create_dir_with_mode, set_mode};
use crate::error::{Result, SymctlError};
use crate::plugins::BIN_DIR;

/// Mode given to downloads installed without an archive.
const BARE_EXECUTABLE_MODE: u32 = 0o755;

/// How a downloaded file is turned into an install tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// `.gz` / `.tgz`: gzip-compressed tar.
    TarGz,
    /// `.zip`
    Zip,
    /// Anything else: a single executable, placed in `bin/` as-is.
    Bare,
}

impl ArchiveKind {
    /// Classify by file extension, case-insensitively.
    pub fn detect(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("gz") | Some("tgz") => ArchiveKind::TarGz,
            Some("zip") => ArchiveKind::Zip,
            _ => ArchiveKind::Bare,
        }
    }
}

/// Extract `archive` into the existing directory `dest`, classified by its
/// own file name.
pub fn extract(archive: &Path, dest: &Path) -> Result<ArchiveKind> {
    let kind = ArchiveKind::detect(archive);
    let name = archive.file_name().ok_or_else(|| {
        SymctlError::Resolution(format!("cannot install {}: no file name", archive.display()))
    })?;
    extract_as(kind, archive, name, dest)?;
    Ok(kind)
}

/// Extract `archive` as `kind`. A bare executable is installed as
/// `bin/<name>`.
pub fn extract_as(kind: ArchiveKind, archive: &Path, name: &OsStr, dest: &Path) -> Result<()> {
    tracing::debug!("Extracting {} as {:?}", archive.display(), kind);
    match kind {
        ArchiveKind::TarGz => extract_tar_gz(archive, dest),
        ArchiveKind::Zip => extract_zip(archive, dest),
        ArchiveKind::Bare => place_bare_executable(archive, name, dest),
    }
}

/// Join an archive entry name onto `dest`, refusing anything that escapes.
///
/// Root and drive prefixes are dropped, so `/etc/x` lands at `dest/etc/x`.
/// `..` may walk back up inside the entry name but never past `dest`.
/// Returns `dest` itself for names like `.` or `./`.
pub fn safe_join(dest: &Path, name: &Path) -> Result<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in name.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() {
                    return Err(SymctlError::Security { path: dest.join(name) });
                }
            }
            Component::Normal(part) => parts.push(part),
        }
    }

    let mut out = dest.to_path_buf();
    out.extend(parts);
    Ok(out)
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)
        .map_err(|e| SymctlError::fs(format!("failed to open {}", archive.display()), e))?;
    let mut tar = Archive::new(GzDecoder::new(file));
    let read_err = |e: io::Error| SymctlError::fs(format!("failed to read {}", archive.display()), e);

    // Directory modes are applied last so a read-only directory does not
    // block writing its own contents.
    let mut dir_modes = Vec::new();

    for entry in tar.entries().map_err(read_err)? {
        let mut entry = entry.map_err(read_err)?;
        let name = entry.path().map_err(read_err)?.into_owned();
        let path = safe_join(dest, &name)?;
        let mode = entry.header().mode().map_err(read_err)?;

        tracing::debug!("Unarchiving {}", path.display());

        match entry.header().entry_type() {
            EntryType::Directory => {
                create_dir_with_mode(&path, None)?;
                if path != dest {
                    dir_modes.push((path, mode));
                }
            }
            EntryType::Regular | EntryType::Continuous => {
                if path == dest {
                    return Err(SymctlError::Security { path: dest.join(&name) });
                }
                write_entry(&mut entry, &path, mode)?;
            }
            other => {
                tracing::debug!("Skipping {:?} entry {}", other, name.display());
            }
        }
    }

    for (path, mode) in dir_modes.into_iter().rev() {
        set_mode(&path, mode)?;
    }
    Ok(())
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive)
        .map_err(|e| SymctlError::fs(format!("failed to open {}", archive.display()), e))?;
    let zip_err = |e: zip::result::ZipError| {
        SymctlError::fs(
            format!("failed to read {}", archive.display()),
            io::Error::new(io::ErrorKind::InvalidData, e),
        )
    };
    let mut zip = ZipArchive::new(file).map_err(zip_err)?;

    let mut dir_modes = Vec::new();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(zip_err)?;
        let name = PathBuf::from(entry.name().replace('\\', "/"));
        let path = safe_join(dest, &name)?;
        if path == dest {
            if entry.is_dir() {
                continue;
            }
            return Err(SymctlError::Security { path: dest.join(&name) });
        }

        tracing::debug!("Unzipping {}", path.display());

        if entry.is_dir() {
            create_dir_with_mode(&path, None)?;
            if let Some(mode) = entry.unix_mode() {
                dir_modes.push((path, mode));
            }
            continue;
        }

        let mode = entry.unix_mode().unwrap_or(0o644);
        write_entry(&mut entry, &path, mode)?;
    }

    for (path, mode) in dir_modes.into_iter().rev() {
        set_mode(&path, mode)?;
    }
    Ok(())
}

fn write_entry(reader: &mut impl io::Read, path: &Path, mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_with_mode(parent, None)?;
    }
    let mut out = File::create(path)
        .map_err(|e| SymctlError::fs(format!("failed to create {}", path.display()), e))?;
    io::copy(reader, &mut out)
        .map_err(|e| SymctlError::fs(format!("failed to write {}", path.display()), e))?;
    drop(out);
    set_mode(path, mode)
}

fn place_bare_executable(file: &Path, name: &OsStr, dest: &Path) -> Result<()> {
    let bin = dest.join(BIN_DIR);
    create_dir_with_mode(&bin, None)?;
    let target = bin.join(name);
    fs::copy(file, &target)
        .map_err(|e| SymctlError::fs(format!("failed to copy {}", file.display()), e))?;
    set_mode(&target, BARE_EXECUTABLE_MODE)
}
