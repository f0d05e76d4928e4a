// ossbridge - object storage adapters for file-oriented access
// Copyright 2025 ossbridge developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP/WebDAV adapter scenarios against the canned-response server.

use std::sync::Arc;

use crate::engine::{Engine, EngineConfig};
use crate::http::fs::{HttpFs, HttpFsConfig};
use crate::oss::api::{ObjectDir, ObjectFile, ObjectFs, OpenEnv};
use crate::oss::logging::LogMask;
use crate::oss::testserver::{find_subslice, response, serve};

const HOST: &str = "storage.example.org";

fn engine() -> Arc<Engine> {
    Engine::start(EngineConfig {
        workers: 1,
        ..EngineConfig::default()
    })
    .unwrap()
}

fn fs_for(base: &str) -> Arc<HttpFs> {
    HttpFs::new(
        engine(),
        HttpFsConfig {
            host_name: HOST.into(),
            host_url: base.into(),
            mask: LogMask::default_mask(),
            ..Default::default()
        },
    )
}

fn path(object: &str) -> String {
    format!("/{HOST}/{object}")
}

#[tokio::test]
async fn small_object_write_issues_single_put() {
    let (base, server) = serve(vec![response("200 OK", "")]).await;
    let fs = fs_for(&base);
    let mut env = OpenEnv::new();
    env.set("oss.asize", "12");

    let mut file = fs.new_file();
    file.open(&path("o.txt"), libc::O_WRONLY | libc::O_CREAT, 0o644, &env)
        .await
        .unwrap();
    assert_eq!(file.write(b"Hello, POSC!", 0).await.unwrap(), 12);
    file.close().await.unwrap();

    let seen = server.await.unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].line(), "PUT /o.txt HTTP/1.1");
    assert_eq!(seen[0].body.as_slice(), b"Hello, POSC!");
}

#[tokio::test]
async fn streaming_write_with_declared_size_sets_content_length() {
    let (base, server) = serve(vec![response("200 OK", "")]).await;
    let fs = fs_for(&base);
    let mut env = OpenEnv::new();
    env.set("oss.asize", "10");

    let mut file = fs.new_file();
    file.open(&path("big.bin"), libc::O_WRONLY | libc::O_CREAT, 0o644, &env)
        .await
        .unwrap();
    file.write(b"01234", 0).await.unwrap();
    // The chunk that completes the declared size finishes the upload.
    file.write(b"56789", 5).await.unwrap();
    file.close().await.unwrap();

    let seen = server.await.unwrap();
    assert!(seen[0].has_header("content-length: 10"));
    assert_eq!(seen[0].body.as_slice(), b"0123456789");
}

#[tokio::test]
async fn unknown_size_write_streams_chunked_until_close() {
    let (base, server) = serve(vec![response("200 OK", "")]).await;
    let fs = fs_for(&base);
    let env = OpenEnv::new();

    let mut file = fs.new_file();
    file.open(&path("stream.bin"), libc::O_WRONLY | libc::O_CREAT, 0o644, &env)
        .await
        .unwrap();
    file.write(b"first", 0).await.unwrap();
    file.write(b"second", 5).await.unwrap();
    // Close terminates the chunked encoding with a final empty chunk.
    file.close().await.unwrap();

    let seen = server.await.unwrap();
    assert!(seen[0].has_header("transfer-encoding: chunked"));
    assert!(find_subslice(&seen[0].body, b"first").is_some());
    assert!(find_subslice(&seen[0].body, b"second").is_some());
    assert!(find_subslice(&seen[0].body, b"0\r\n\r\n").is_some());
}

#[tokio::test]
async fn out_of_order_writes_are_rejected() {
    let (base, _server) = serve(vec![]).await;
    let fs = fs_for(&base);
    let env = OpenEnv::new();

    let mut file = fs.new_file();
    file.open(&path("o.bin"), libc::O_WRONLY | libc::O_CREAT, 0o644, &env)
        .await
        .unwrap();
    let err = file.write(b"late", 9).await.unwrap_err();
    assert_eq!(err.neg_errno(), -libc::EIO);
}

#[tokio::test]
async fn close_without_writes_creates_zero_length_object() {
    let (base, server) = serve(vec![response("200 OK", "")]).await;
    let fs = fs_for(&base);
    let env = OpenEnv::new();

    let mut file = fs.new_file();
    file.open(&path("empty"), libc::O_WRONLY | libc::O_CREAT, 0o644, &env)
        .await
        .unwrap();
    file.close().await.unwrap();

    let seen = server.await.unwrap();
    assert_eq!(seen[0].line(), "PUT /empty HTTP/1.1");
    assert!(seen[0].body.is_empty());
}

#[tokio::test]
async fn ranged_read_downloads_into_the_buffer() {
    let (base, server) = serve(vec![response("206 Partial Content", "llo, ")]).await;
    let fs = fs_for(&base);
    let env = OpenEnv::new();

    let mut file = fs.new_file();
    file.open(&path("o.txt"), libc::O_RDWR, 0, &env).await.unwrap();
    let mut buf = [0u8; 5];
    let n = file.read(&mut buf, 2).await.unwrap();
    assert_eq!(&buf[..n], b"llo, ");

    let seen = server.await.unwrap();
    assert_eq!(seen[0].line(), "GET /o.txt HTTP/1.1");
    assert!(seen[0].has_header("range: bytes=2-6"));
}

#[tokio::test]
async fn fstat_parses_headers_and_caches() {
    let head = "HTTP/1.1 200 OK\r\nContent-Length: 1337\r\n\
        Last-Modified: Tue, 21 May 2024 11:02:53 GMT\r\nConnection: close\r\n\r\n";
    let (base, server) = serve(vec![head.to_string()]).await;
    let fs = fs_for(&base);
    let env = OpenEnv::new();

    let mut file = fs.new_file();
    file.open(&path("o.txt"), libc::O_RDWR, 0, &env).await.unwrap();
    let info = file.fstat().await.unwrap();
    assert_eq!(info.size, 1337);
    assert!(info.is_regular());
    assert!(info.mtime > 0);

    // The second call is served from the cache.
    assert_eq!(file.fstat().await.unwrap().size, 1337);
    let seen = server.await.unwrap();
    assert_eq!(seen[0].line(), "HEAD /o.txt HTTP/1.1");
}

#[tokio::test]
async fn read_only_open_probes_for_existence() {
    let (base, _server) = serve(vec![response("404 Not Found", "")]).await;
    let fs = fs_for(&base);
    let env = OpenEnv::new();

    let mut file = fs.new_file();
    let err = file.open(&path("missing"), 0, 0, &env).await.unwrap_err();
    assert_eq!(err.neg_errno(), -libc::ENOENT);
}

#[tokio::test]
async fn read_only_open_of_the_endpoint_root_is_a_directory() {
    let head = "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    let (base, _server) = serve(vec![head.to_string()]).await;
    let fs = fs_for(&base);
    let env = OpenEnv::new();

    let mut file = fs.new_file();
    let err = file
        .open(&format!("/{HOST}"), 0, 0, &env)
        .await
        .unwrap_err();
    assert_eq!(err.neg_errno(), -libc::EISDIR);
}

#[tokio::test]
async fn double_open_is_rejected() {
    let (base, server) = serve(vec![response("200 OK", "")]).await;
    let fs = fs_for(&base);
    let env = OpenEnv::new();

    let mut file = fs.new_file();
    file.open(&path("o.txt"), libc::O_WRONLY | libc::O_CREAT, 0o644, &env)
        .await
        .unwrap();
    let err = file
        .open(&path("other"), libc::O_WRONLY, 0o644, &env)
        .await
        .unwrap_err();
    assert_eq!(err.neg_errno(), -libc::EBADF);
    file.close().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn negative_asize_fails_the_open() {
    let (base, _server) = serve(vec![]).await;
    let fs = fs_for(&base);
    let mut env = OpenEnv::new();
    env.set("oss.asize", "-5");

    let mut file = fs.new_file();
    let err = file
        .open(&path("bad"), libc::O_WRONLY | libc::O_CREAT, 0o644, &env)
        .await
        .unwrap_err();
    assert_eq!(err.neg_errno(), -libc::EIO);
}

#[tokio::test]
async fn foreign_path_prefix_is_enoent() {
    let (base, _server) = serve(vec![]).await;
    let fs = fs_for(&base);
    let env = OpenEnv::new();

    let mut file = fs.new_file();
    let err = file
        .open("/other.host/o.txt", libc::O_RDWR, 0, &env)
        .await
        .unwrap_err();
    assert_eq!(err.neg_errno(), -libc::ENOENT);
}

#[tokio::test]
async fn propfind_lists_the_collection() {
    let multistatus = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dir/</D:href>
    <D:propstat><D:prop>
      <D:resourcetype><D:collection/></D:resourcetype>
    </D:prop></D:propstat>
  </D:response>
  <D:response>
    <D:href>/dir/notes.txt</D:href>
    <D:propstat><D:prop>
      <D:resourcetype/>
      <D:getcontentlength>17</D:getcontentlength>
      <D:getlastmodified>Tue, 21 May 2024 11:02:53 GMT</D:getlastmodified>
    </D:prop></D:propstat>
  </D:response>
  <D:response>
    <D:href>/dir/subdir/</D:href>
    <D:propstat><D:prop>
      <D:resourcetype><D:collection/></D:resourcetype>
    </D:prop></D:propstat>
  </D:response>
</D:multistatus>"#;
    let (base, server) = serve(vec![response("207 Multi-Status", multistatus)]).await;
    let fs = fs_for(&base);
    let env = OpenEnv::new();

    let mut dir = fs.new_dir();
    dir.stat_ret();
    dir.opendir(&path("dir"), &env).await.unwrap();

    let mut names = Vec::new();
    let mut sizes = Vec::new();
    while let Some(entry) = dir.readdir(255).await.unwrap() {
        names.push(entry.name);
        sizes.push(entry.info.map(|i| i.size));
    }
    dir.close().await.unwrap();

    assert_eq!(names, ["notes.txt", "subdir"]);
    assert_eq!(sizes[0], Some(17));

    let seen = server.await.unwrap();
    assert_eq!(seen[0].line(), "PROPFIND /dir HTTP/1.1");
    assert!(seen[0].has_header("depth: 1"));
    assert!(seen[0].has_header("content-type: application/xml"));
    assert!(find_subslice(&seen[0].body, b"<d:resourcetype/>").is_some());
}
