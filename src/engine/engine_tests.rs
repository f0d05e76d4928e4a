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

//! Engine tests against a minimal in-process HTTP responder.

use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

use super::request::{Request, RequestBody, now_millis};
use super::{Engine, EngineConfig};
use crate::oss::error::Error;
use crate::oss::testserver::{find_subslice, response, serve};

fn small_engine() -> Arc<Engine> {
    Engine::start(EngineConfig {
        workers: 1,
        ..EngineConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn get_returns_body() {
    let (base, server) = serve(vec![response("200 OK", "hello")]).await;
    let engine = small_engine();

    let resp = engine
        .execute(Request::new(Method::GET, format!("{base}/obj")), RequestBody::Empty)
        .await
        .unwrap();

    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.as_ref(), b"hello");
    let seen = server.await.unwrap();
    assert_eq!(seen[0].line(), "GET /obj HTTP/1.1");
    engine.shutdown().await;
}

#[tokio::test]
async fn unexpected_status_surfaces_verbatim() {
    let (base, _server) = serve(vec![response("404 Not Found", "missing")]).await;
    let engine = small_engine();

    let err = engine
        .execute(Request::new(Method::GET, format!("{base}/nope")), RequestBody::Empty)
        .await
        .unwrap_err();

    match &err {
        Error::HttpStatusUnexpected { status, body, .. } => {
            assert_eq!(*status, 404);
            assert_eq!(body, "missing");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.neg_errno(), -libc::ENOENT);
    engine.shutdown().await;
}

#[tokio::test]
async fn rate_limited_request_retries_once() {
    let marker = "<Error><Code>RequestLimitExceeded</Code></Error>";
    let (base, server) = serve(vec![
        response("503 Service Unavailable", marker),
        response("200 OK", "ok"),
    ])
    .await;
    let engine = small_engine();

    let resp = engine
        .execute(Request::new(Method::GET, format!("{base}/obj")), RequestBody::Empty)
        .await
        .unwrap();
    assert_eq!(resp.body.as_ref(), b"ok");

    // The retry is silent: the server saw two requests.
    let seen = server.await.unwrap();
    assert_eq!(seen.len(), 2);
    engine.shutdown().await;
}

#[tokio::test]
async fn second_rate_limit_propagates() {
    let marker = "<Error><Code>RequestLimitExceeded</Code></Error>";
    let (base, _server) = serve(vec![
        response("503 Service Unavailable", marker),
        response("503 Service Unavailable", marker),
    ])
    .await;
    let engine = small_engine();

    let err = engine
        .execute(Request::new(Method::GET, format!("{base}/obj")), RequestBody::Empty)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RequestLimitExceeded));
    engine.shutdown().await;
}

#[tokio::test]
async fn plain_503_is_not_retried() {
    let (base, server) = serve(vec![response("503 Service Unavailable", "busy")]).await;
    let engine = small_engine();

    let err = engine
        .execute(Request::new(Method::GET, format!("{base}/obj")), RequestBody::Empty)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HttpStatusUnexpected { status: 503, .. }));
    assert_eq!(server.await.unwrap().len(), 1);
    engine.shutdown().await;
}

#[tokio::test]
async fn streaming_put_with_known_length() {
    let (base, server) = serve(vec![response("200 OK", "")]).await;
    let engine = small_engine();

    let request = Request::new(Method::PUT, format!("{base}/obj"));
    let (handle, pending) = engine.execute_streaming(request, Some(12)).await.unwrap();

    handle.send(Bytes::from_static(b"Hello, "), false).await.unwrap();
    handle.send(Bytes::from_static(b"POSC!"), true).await.unwrap();

    let resp = pending.wait().await.unwrap();
    assert_eq!(resp.status, 200);

    let seen = server.await.unwrap();
    assert!(seen[0].has_header("content-length: 12"));
    assert_eq!(seen[0].body.as_slice(), b"Hello, POSC!");
    engine.shutdown().await;
}

#[tokio::test]
async fn streaming_put_without_length_uses_chunked_encoding() {
    let (base, server) = serve(vec![response("200 OK", "")]).await;
    let engine = small_engine();

    let request = Request::new(Method::PUT, format!("{base}/obj"));
    let (handle, pending) = engine.execute_streaming(request, None).await.unwrap();

    handle.send(Bytes::from_static(b"chunk-one"), false).await.unwrap();
    // Final empty chunk terminates the chunked encoding.
    handle.send(Bytes::new(), true).await.unwrap();

    let resp = pending.wait().await.unwrap();
    assert_eq!(resp.status, 200);

    let seen = server.await.unwrap();
    assert!(seen[0].has_header("transfer-encoding: chunked"));
    assert!(find_subslice(&seen[0].body, b"chunk-one").is_some());
    assert!(find_subslice(&seen[0].body, b"0\r\n\r\n").is_some());
    engine.shutdown().await;
}

#[tokio::test]
async fn tick_fails_silent_streaming_producer() {
    // Server that accepts and then reads until the client goes away.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        while sock.read(&mut buf).await.unwrap_or(0) > 0 {}
    });

    let engine = small_engine();
    let request = Request::new(Method::PUT, format!("http://{addr}/obj"));
    let (handle, pending) = engine.execute_streaming(request, Some(1 << 20)).await.unwrap();
    handle.send(Bytes::from_static(b"start"), false).await.unwrap();

    // Pretend the producer has been silent past the inactivity window.
    engine.tick(now_millis() + 11_000);

    let err = pending.wait().await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));

    // The producer learns of the failure on its next continuation.
    let err = handle.send(Bytes::from_static(b"more"), false).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    engine.shutdown().await;
}

#[tokio::test]
async fn submit_after_shutdown_fails() {
    let engine = small_engine();
    engine.shutdown().await;

    let err = engine
        .execute(
            Request::new(Method::GET, "http://127.0.0.1:9/unreachable"),
            RequestBody::Empty,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Internal(_)));
}

#[tokio::test]
async fn concurrent_requests_all_complete() {
    let (base, _server) = serve(vec![
        response("200 OK", "a"),
        response("200 OK", "b"),
        response("200 OK", "c"),
    ])
    .await;
    let engine = small_engine();

    let mut pendings = Vec::new();
    for _ in 0..3 {
        pendings.push(
            engine
                .submit(Request::new(Method::GET, format!("{base}/x")), RequestBody::Empty)
                .await
                .unwrap(),
        );
    }
    let mut bodies: Vec<String> = Vec::new();
    for pending in pendings {
        let resp = pending.wait().await.unwrap();
        bodies.push(String::from_utf8_lossy(&resp.body).into_owned());
    }
    bodies.sort();
    assert_eq!(bodies, ["a", "b", "c"]);
    assert_eq!(engine.in_flight(), 0);
    engine.shutdown().await;
}

#[tokio::test]
async fn bearer_token_is_attached() {
    let mut token_path = std::env::temp_dir();
    token_path.push(format!("ossbridge-engine-token-{}", std::process::id()));
    std::fs::write(&token_path, "bearer-secret\n").unwrap();

    let (base, server) = serve(vec![response("200 OK", "")]).await;
    let engine = small_engine();

    let mut request = Request::new(Method::GET, format!("{base}/obj"));
    request.token = Some(Arc::new(crate::http::token::TokenFile::new(
        token_path.to_str().unwrap(),
    )));
    engine.execute(request, RequestBody::Empty).await.unwrap();

    let seen = server.await.unwrap();
    assert!(seen[0].has_header("authorization: Bearer bearer-secret"));
    std::fs::remove_file(token_path).ok();
    engine.shutdown().await;
}
