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

//! Worker task: drains the shared queue and drives its transfers on one
//! HTTP client.

use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures_util::StreamExt;
use http::Method;
use log::{debug, warn};
use tokio::sync::mpsc;

use crate::engine::EngineConfig;
use crate::engine::request::{ActiveRequest, Chunk, HttpResponse, Request, RequestBody, RequestState, now_millis};
use crate::oss::error::{Error, Result};
use crate::engine::queue::HandlerQueue;

const RATE_LIMIT_MARKER: &str = "<Error><Code>RequestLimitExceeded</Code>";

/// Runs until the queue is closed and drained.
pub(crate) async fn run_worker(
    idx: usize,
    client: reqwest::Client,
    queue: Arc<HandlerQueue<ActiveRequest>>,
    registry: Arc<DashMap<u64, Arc<RequestState>>>,
    cfg: EngineConfig,
) {
    if cfg.mask.debug_enabled() {
        debug!("started HTTP worker {idx}");
    }
    let mut active = futures_util::stream::FuturesUnordered::new();
    let mut last_marker = Instant::now();

    loop {
        // Admit new work: block for the first request, then top up to the
        // per-worker cap without waiting.
        while active.len() < cfg.max_ops_per_worker {
            if active.is_empty() {
                match queue.consume().await {
                    Some(op) => active.push(execute_one(
                        client.clone(),
                        op,
                        Arc::clone(&registry),
                        cfg,
                    )),
                    None => {
                        if cfg.mask.debug_enabled() {
                            debug!("HTTP worker {idx} shutting down");
                        }
                        return;
                    }
                }
            } else {
                match queue.try_consume() {
                    Some(op) => active.push(execute_one(
                        client.clone(),
                        op,
                        Arc::clone(&registry),
                        cfg,
                    )),
                    None => break,
                }
            }
        }

        if last_marker.elapsed() >= cfg.marker_period {
            if cfg.mask.debug_enabled() {
                debug!("HTTP worker {idx} is running {} operations", active.len());
            }
            last_marker = Instant::now();
        }

        tokio::select! {
            _ = active.next(), if !active.is_empty() => {}
            _ = tokio::time::sleep(cfg.poll_interval) => {}
        }
    }
}

/// Drives a single transfer to completion and signals the caller.
async fn execute_one(
    client: reqwest::Client,
    op: ActiveRequest,
    registry: Arc<DashMap<u64, Arc<RequestState>>>,
    cfg: EngineConfig,
) {
    let ActiveRequest {
        request,
        mut body,
        state,
        done,
    } = op;

    let result = tokio::select! {
        res = perform(&client, &request, &mut body, &state, cfg) => res,
        err = stall_guard(&state, cfg) => Err(err),
    };

    if let Err(ref e) = result {
        warn!("{} {} failed [{}]: {e}", request.method, request.url, e.tag());
    }
    registry.remove(&state.id);
    let _ = done.send(result);
}

/// Fires when the transfer makes no byte progress for the stall window,
/// or when the tick sweep has already failed the request.
async fn stall_guard(state: &RequestState, cfg: EngineConfig) -> Error {
    loop {
        tokio::time::sleep(cfg.poll_interval).await;
        if state.is_timed_out() {
            return Error::Timeout("transfer has timed out due to inactivity".into());
        }
        let idle = now_millis() - state.last_movement.load(std::sync::atomic::Ordering::Relaxed);
        if idle > cfg.transfer_stall.as_millis() as i64 {
            state.mark_timed_out();
            return Error::Timeout("I/O stall during transfer".into());
        }
    }
}

async fn perform(
    client: &reqwest::Client,
    request: &Request,
    body: &mut RequestBody,
    state: &Arc<RequestState>,
    cfg: EngineConfig,
) -> Result<HttpResponse> {
    let retryable = !body.is_streaming();
    let mut attempt = 0u32;

    loop {
        let builder = prepare(client, request, body, state)?;
        let response = builder.send().await.map_err(Error::from)?;
        state.touch_movement();

        let status = response.status().as_u16();
        let headers = response.headers().clone();

        let mut buf = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(Error::from)?;
            state.touch_movement();
            buf.extend_from_slice(&chunk);
        }
        let body_bytes = buf.freeze();

        if status == 503 && contains_marker(&body_bytes) {
            if retryable && attempt == 0 {
                attempt += 1;
                if cfg.mask.debug_enabled() {
                    debug!(
                        "{} {}: rate limited, retrying once",
                        request.method, request.url
                    );
                }
                continue;
            }
            return Err(Error::RequestLimitExceeded);
        }

        if status != request.expected_status {
            let text = if body_bytes.is_empty() {
                format!(
                    "HTTP response was {status}, not {}, and no body was returned",
                    request.expected_status
                )
            } else {
                String::from_utf8_lossy(&body_bytes).into_owned()
            };
            return Err(Error::HttpStatusUnexpected {
                status,
                expected: request.expected_status,
                body: text,
            });
        }

        return Ok(HttpResponse {
            status,
            headers,
            body: body_bytes,
        });
    }
}

fn contains_marker(body: &Bytes) -> bool {
    body.windows(RATE_LIMIT_MARKER.len())
        .any(|w| w == RATE_LIMIT_MARKER.as_bytes())
}

fn prepare(
    client: &reqwest::Client,
    request: &Request,
    body: &mut RequestBody,
    state: &Arc<RequestState>,
) -> Result<reqwest::RequestBuilder> {
    let mut builder = client.request(request.method.clone(), &request.url);

    for (name, values) in request.headers.iter_all() {
        for value in values {
            // An empty value suppresses the header on the wire.
            if !value.is_empty() {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
    }

    if let Some(token_file) = &request.token {
        if !request.headers.contains_key("Authorization") {
            if let Some(token) = token_file.get()? {
                builder = builder.bearer_auth(token);
            }
        }
    }

    match body {
        RequestBody::Empty => {}
        RequestBody::Full(bytes) => {
            builder = builder.body(bytes.clone());
        }
        RequestBody::Streaming { rx, content_length } => {
            if request.method != Method::PUT {
                return Err(Error::NotImplemented(
                    "streaming bodies are only supported for PUT".into(),
                ));
            }
            // The channel can be consumed only once; streaming requests
            // are never retried.
            let (dummy_tx, dummy_rx) = mpsc::channel(1);
            drop(dummy_tx);
            let rx = std::mem::replace(rx, dummy_rx);
            if let Some(length) = content_length {
                builder = builder.header(http::header::CONTENT_LENGTH, *length);
            }
            builder = builder.body(reqwest::Body::wrap_stream(chunk_stream(
                rx,
                Arc::clone(state),
            )));
        }
    }

    Ok(builder)
}

/// Adapts the producer channel into a byte stream, bumping the movement
/// timestamp as chunks flow.  The stream ends after the final chunk.
fn chunk_stream(
    rx: mpsc::Receiver<Chunk>,
    state: Arc<RequestState>,
) -> impl futures_util::Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send {
    futures_util::stream::unfold((rx, state, false), |(mut rx, state, done)| async move {
        if done {
            return None;
        }
        match rx.recv().await {
            Some(chunk) => {
                state.touch_movement();
                let finished = chunk.last;
                Some((Ok(chunk.data), (rx, state, finished)))
            }
            None => None,
        }
    })
}
