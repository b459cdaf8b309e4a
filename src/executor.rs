// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Running plugins as child processes.
//!
//! The child's stdout and stderr are both relayed, line by line, into one
//! sink. Each stream has its own reader thread, so lines appear in the order
//! the child produced them (per stream) and a child that fills one pipe can
//! never stall on the other. A line is always written whole.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread;

use crate::error::{Result, SymctlError};
use crate::plugins::plugin_program;

/// Initial capacity of each line reader. Lines longer than this still work,
/// the buffer grows.
const LINE_BUFFER_BYTES: usize = 64 * 1024;

/// Spawns `symctl-<name>` executables.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    plugin_dir: Option<PathBuf>,
}

impl Executor {
    /// Executor resolving plugins through `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefer `<dir>/symctl-<name>` when it exists, falling back to `PATH`.
    pub fn with_plugin_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            plugin_dir: Some(dir.into()),
        }
    }

    /// Program that will be spawned for `plugin`.
    pub fn resolve(&self, plugin: &str) -> OsString {
        let program = plugin_program(plugin);
        if let Some(dir) = &self.plugin_dir {
            let candidate = dir.join(&program);
            if candidate.is_file() {
                return candidate.into_os_string();
            }
        }
        program.into()
    }

    /// Run `plugin` with `args`, relaying its output to our stdout.
    pub fn execute<S: AsRef<std::ffi::OsStr>>(&self, plugin: &str, args: &[S]) -> Result<()> {
        self.execute_to(plugin, args, io::stdout())
    }

    /// Run `plugin` with `args`, relaying its output into `sink`.
    pub fn execute_to<S, W>(&self, plugin: &str, args: &[S], sink: W) -> Result<()>
    where
        S: AsRef<std::ffi::OsStr>,
        W: Write + Send,
    {
        let program = self.resolve(plugin);
        let program_name = program.to_string_lossy().into_owned();
        tracing::debug!("Plugin executable: {}", program_name);
        tracing::debug!(
            "Plugin arguments: {:?}",
            args.iter().map(|a| a.as_ref().to_string_lossy()).collect::<Vec<_>>()
        );

        let mut child = Command::new(&program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&program_name, e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let sink = Mutex::new(sink);

        let shared = &sink;

        let relayed = thread::scope(|scope| {
            let out = stdout.map(|pipe| scope.spawn(move || relay_lines(pipe, shared)));
            let err = stderr.map(|pipe| scope.spawn(move || relay_lines(pipe, shared)));
            [out, err]
                .into_iter()
                .flatten()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(io::Error::other("output relay thread panicked")))
                })
                .collect::<io::Result<()>>()
        });

        // Always reap the child, even when relaying failed.
        let status = child.wait().map_err(|e| SymctlError::Process {
            program: program_name.clone(),
            reason: format!("could not be waited on: {}", e),
            code: None,
        })?;

        relayed.map_err(|e| SymctlError::Process {
            program: program_name.clone(),
            reason: format!("output could not be relayed: {}", e),
            code: None,
        })?;

        check_status(&program_name, status)
    }
}

fn spawn_error(program: &str, e: io::Error) -> SymctlError {
    let reason = if e.kind() == io::ErrorKind::NotFound {
        "was not found; is it installed and on PATH?".to_string()
    } else {
        format!("could not be started: {}", e)
    };
    SymctlError::Process {
        program: program.to_string(),
        reason,
        code: None,
    }
}

fn check_status(program: &str, status: ExitStatus) -> Result<()> {
    tracing::debug!("{} finished with {}", program, status);
    if status.success() {
        return Ok(());
    }
    let (reason, code) = match status.code() {
        Some(code) => (format!("exited with status {}", code), Some(code)),
        None => ("was terminated by a signal".to_string(), None),
    };
    Err(SymctlError::Process {
        program: program.to_string(),
        reason,
        code,
    })
}

/// Copy `reader` into the shared sink one line at a time. A trailing line
/// without a terminator gets one.
fn relay_lines<R: Read, W: Write>(reader: R, sink: &Mutex<W>) -> io::Result<()> {
    let mut reader = BufReader::with_capacity(LINE_BUFFER_BYTES, reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        if !line.ends_with(b"\n") {
            line.push(b'\n');
        }
        let mut out = lock_sink(sink);
        out.write_all(&line)?;
        out.flush()?;
    }
}

/// Lock the sink, recovering the guard if another relay thread panicked.
fn lock_sink<W>(sink: &Mutex<W>) -> MutexGuard<'_, W> {
    match sink.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Output sink lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
