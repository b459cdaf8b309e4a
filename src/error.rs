// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error taxonomy and user-facing diagnostics for symctl.
//!
//! Every library operation returns [`Result`], whose error type
//! [`SymctlError`] names the failure class. None of them are retried: the
//! binary prints a diagnostic built with [`ErrorBuilder`] and exits with
//! [`SymctlError::exit_code`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Issue tracker shown at the bottom of every diagnostic.
pub const ISSUES_URL: &str = "https://github.com/SymmetricalAI/symctl/issues";

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, SymctlError>;

/// Failure classes of the acquisition and execution pipeline.
#[derive(Debug, Error)]
pub enum SymctlError {
    /// Catalog, asset or release API request failed.
    #[error("network error: {context}: {source}")]
    Network {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Remote server answered with a non-success status.
    #[error("network error: {context}: HTTP {status}")]
    HttpStatus {
        context: String,
        status: reqwest::StatusCode,
    },

    /// Response body was not the JSON we expected.
    #[error("decode error: {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// No release, URL or asset matched.
    #[error("{0}")]
    Resolution(String),

    /// Archive entry would land outside the extraction root.
    #[error("{}: illegal file path", .path.display())]
    Security { path: PathBuf },

    /// Directory listing, file creation, copy, lock or rename failure.
    #[error("filesystem error: {context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Plugin could not be spawned or finished unsuccessfully.
    #[error("plugin {program} {reason}")]
    Process {
        program: String,
        reason: String,
        code: Option<i32>,
    },
}

impl SymctlError {
    pub(crate) fn network(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Network { context: context.into(), source: source.into() }
    }

    pub(crate) fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode { context: context.into(), source }
    }

    pub(crate) fn fs(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Filesystem { context: context.into(), source }
    }

    /// Exit status the dispatcher should terminate with.
    ///
    /// A plugin that exited with its own code hands that code through;
    /// everything else is a generic failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Process { code: Some(code), .. } if *code != 0 => *code,
            _ => 1,
        }
    }

    /// Human title for the diagnostic header.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Network { .. } | Self::HttpStatus { .. } => "Download failed",
            Self::Decode { .. } => "Could not read the release catalog",
            Self::Resolution(_) => "Nothing to install for this platform",
            Self::Security { .. } => "Refusing to extract archive",
            Self::Filesystem { .. } => "Filesystem operation failed",
            Self::Process { .. } => "Plugin failed",
        }
    }

    /// Build the full user-facing diagnostic.
    pub fn diagnostic(&self) -> ErrorBuilder {
        let builder = ErrorBuilder::new(self.title()).cause(self.to_string());
        match self {
            Self::Network { .. } | Self::HttpStatus { .. } => builder
                .fix("Check the URL and your network connection")
                .fix("Re-run with --talkative for request details"),
            Self::Decode { .. } => builder
                .fix("Make sure the URL points at a JSON release catalog"),
            Self::Resolution(_) => builder
                .fix("Ask the publisher for a build for this OS/architecture"),
            Self::Security { .. } => builder
                .fix("Do not install this archive; report it to its publisher"),
            Self::Filesystem { .. } => builder
                .fix("Check permissions on the install directory"),
            Self::Process { .. } => builder
                .fix("Run `symctl plugins` to see installed plugins"),
        }
    }
}

/// Formats an error message with title, causes, fixes, and help link.
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = format!("[✗] {}\n\n", title);

    if !causes.is_empty() {
        output.push_str("Possible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
        output.push('\n');
    }

    if !fixes.is_empty() {
        output.push_str("Try these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
        output.push('\n');
    }

    output.push_str(&format!("Need help? {}", ISSUES_URL));
    output
}

/// Builder for constructing formatted error messages.
///
/// ```
/// use symctl::error::ErrorBuilder;
///
/// let error = ErrorBuilder::new("Plugin failed")
///     .cause("symctl-foo exited with status 3")
///     .fix("Run `symctl plugins` to see installed plugins")
///     .build();
/// assert!(error.contains("[✗] Plugin failed"));
/// ```
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
}

impl ErrorBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    pub fn build(&self) -> String {
        let causes: Vec<&str> = self.causes.iter().map(|s| s.as_str()).collect();
        let fixes: Vec<&str> = self.fixes.iter().map(|s| s.as_str()).collect();
        format_error(&self.title, &causes, &fixes)
    }
}

impl fmt::Display for ErrorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}
