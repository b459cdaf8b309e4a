// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process HTTP fixtures shared by the integration tests.
//!
//! The library speaks blocking HTTP, so the axum server runs on its own
//! tokio runtime in a background thread while tests stay plain `#[test]`s.

#![allow(dead_code)]

use std::io::Write;
use std::net::TcpListener;
use std::thread;

use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Start serving the router built by `build` and return its base URL.
/// `build` receives the base URL so catalogs can point back at the server.
pub fn serve(build: impl FnOnce(&str) -> Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind test listener");
    listener
        .set_nonblocking(true)
        .expect("Failed to make listener non-blocking");
    let base = format!("http://{}", listener.local_addr().expect("No local addr"));
    let router = build(&base);

    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("Failed to build test runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener)
                .expect("Failed to adopt test listener");
            axum::serve(listener, router).await.expect("Test server failed");
        });
    });

    base
}

/// A catalog entry as JSON.
pub fn release(name: &str, created: &str, urls: &[(&str, &str, String)]) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "binaryName": "tools",
        "version": name,
        "description": "test bundle",
        "created": created,
        "urls": urls
            .iter()
            .map(|(platform, os, url)| serde_json::json!({
                "platform": platform,
                "os": os,
                "url": url,
            }))
            .collect::<Vec<_>>(),
    })
}

/// gzip-compressed tar of regular files `(path, mode, contents)`.
pub fn tar_gz(files: &[(&str, u32, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, mode, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(*mode);
        header.set_size(contents.len() as u64);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *contents)
            .expect("Failed to append tar entry");
    }
    let encoder = builder.into_inner().expect("Failed to finish tar");
    encoder.finish().expect("Failed to finish gzip")
}

/// zip archive of `(name, contents)` entries, names written verbatim.
pub fn zip(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, contents) in files {
        writer
            .start_file(*name, zip::write::FileOptions::default().unix_permissions(0o644))
            .expect("Failed to start zip entry");
        writer.write_all(contents).expect("Failed to write zip entry");
    }
    writer.finish().expect("Failed to finish zip").into_inner()
}
