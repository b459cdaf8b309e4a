// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared blocking HTTP plumbing for catalog, asset and release API calls.

use std::io::{self, IsTerminal, Read, Write};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client, Response};
use reqwest::Url;
use serde::de::DeserializeOwned;

use crate::error::{Result, SymctlError};

/// Timeout for establishing a connection. Transfers themselves are unbounded.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Build the blocking client used by every remote call.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(None)
        .user_agent(concat!("symctl/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SymctlError::network("failed to create HTTP client", e))
}

/// Send a request and reject non-success statuses.
pub fn send(request: reqwest::blocking::RequestBuilder, what: &str) -> Result<Response> {
    let response = request
        .send()
        .map_err(|e| SymctlError::network(what, e))?;

    if !response.status().is_success() {
        return Err(SymctlError::HttpStatus {
            context: what.to_string(),
            status: response.status(),
        });
    }
    Ok(response)
}

/// GET `url` and decode the body as JSON.
pub fn get_json<T: DeserializeOwned>(client: &Client, url: &str, what: &str) -> Result<T> {
    let response = send(client.get(url), what)?;
    let body = response
        .bytes()
        .map_err(|e| SymctlError::network(what, e))?;
    serde_json::from_slice(&body).map_err(|e| SymctlError::decode(what, e))
}

/// Last path segment of a URL, used to name downloaded files.
pub fn url_basename(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "download".to_string())
}

/// Stream a response body into `out`, drawing a progress bar when asked
/// and stderr is a terminal. Returns the number of bytes written.
pub fn copy_body(
    response: Response,
    out: &mut (impl Write + ?Sized),
    show_progress: bool,
) -> Result<u64> {
    let bar = progress_bar(response.content_length(), show_progress);
    let what = format!("failed to read {}", response.url());
    let mut reader = bar.wrap_read(response);

    let mut buf = vec![0u8; 64 * 1024];
    let mut written = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SymctlError::network(what, e)),
        };
        out.write_all(&buf[..n])
            .map_err(|e| SymctlError::fs("failed to write downloaded data", e))?;
        written += n as u64;
    }
    out.flush()
        .map_err(|e| SymctlError::fs("failed to write downloaded data", e))?;

    bar.finish_and_clear();
    Ok(written)
}

fn progress_bar(total: Option<u64>, show_progress: bool) -> ProgressBar {
    if !show_progress || !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    match total {
        Some(len) => {
            let bar = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            {
                bar.set_style(style.progress_chars("=> "));
            }
            bar
        }
        None => ProgressBar::new_spinner(),
    }
}
