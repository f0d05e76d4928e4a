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

//! Request, response and completion types shared between the submitting
//! caller and the owning worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use bytes::Bytes;
use http::{HeaderMap, Method};
use tokio::sync::{mpsc, oneshot};

use crate::http::token::TokenFile;
use crate::oss::error::{Error, Result};
use crate::oss::multimap::Multimap;

/// A prepared HTTP request.  URL and verb are fixed at construction.
#[derive(Clone, Debug)]
pub struct Request {
    pub url: String,
    pub method: Method,
    pub headers: Multimap,
    pub expected_status: u16,
    pub token: Option<Arc<TokenFile>>,
}

impl Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Request {
            url: url.into(),
            method,
            headers: Multimap::new(),
            expected_status: 200,
            token: None,
        }
    }
}

/// One chunk of a streaming upload.  An empty `data` with `last` set
/// terminates a chunked transfer.
#[derive(Debug)]
pub struct Chunk {
    pub data: Bytes,
    pub last: bool,
}

/// Body attached to a request at submission time.
pub enum RequestBody {
    Empty,
    Full(Bytes),
    Streaming {
        rx: mpsc::Receiver<Chunk>,
        /// Declared total size; `None` switches to chunked encoding.
        content_length: Option<u64>,
    },
}

impl RequestBody {
    pub fn is_streaming(&self) -> bool {
        matches!(self, RequestBody::Streaming { .. })
    }
}

/// Completed response delivered to the caller.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    /// Parsed `Content-Length`, when present.
    pub fn content_length(&self) -> Option<i64> {
        self.headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }

    /// `Last-Modified` as seconds since the epoch, when present.
    pub fn last_modified(&self) -> Option<i64> {
        self.headers
            .get(http::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| crate::oss::utils::from_http_header_value(v.trim()).ok())
            .map(|t| t.timestamp())
    }

    /// `ETag` header with surrounding quotes stripped.
    pub fn etag(&self) -> Option<String> {
        self.headers
            .get(http::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().trim_matches('"').to_string())
    }

    /// The response headers serialized as a `Name: value\r\n` block, the
    /// form the HEAD verb exposes to callers that parse headers as text.
    pub fn header_block(&self) -> String {
        let mut block = String::new();
        for (name, value) in self.headers.iter() {
            block.push_str(name.as_str());
            block.push_str(": ");
            block.push_str(value.to_str().unwrap_or_default());
            block.push_str("\r\n");
        }
        block
    }
}

/// Timing and liveness state shared by the caller, the worker, and the
/// engine's `tick` sweep.  Timestamps are milliseconds since the epoch,
/// loadable without any lock.
#[derive(Debug)]
pub struct RequestState {
    pub id: u64,
    pub streaming: bool,
    pub last_movement: AtomicI64,
    pub last_producer: AtomicI64,
    pub timed_out: AtomicBool,
}

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

impl RequestState {
    pub fn new(id: u64, streaming: bool) -> Self {
        let now = now_millis();
        RequestState {
            id,
            streaming,
            last_movement: AtomicI64::new(now),
            last_producer: AtomicI64::new(now),
            timed_out: AtomicBool::new(false),
        }
    }

    pub fn touch_movement(&self) {
        self.last_movement.store(now_millis(), Ordering::Relaxed);
    }

    pub fn touch_producer(&self) {
        self.last_producer.store(now_millis(), Ordering::Relaxed);
    }

    pub fn mark_timed_out(&self) {
        self.timed_out.store(true, Ordering::Relaxed);
    }

    pub fn is_timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Relaxed)
    }
}

/// A request travelling through the queue; owned by exactly one worker
/// from dequeue to completion.
pub struct ActiveRequest {
    pub request: Request,
    pub body: RequestBody,
    pub state: Arc<RequestState>,
    pub done: oneshot::Sender<Result<HttpResponse>>,
}

/// Caller's handle to an in-flight request.
pub struct PendingRequest {
    pub(crate) state: Arc<RequestState>,
    pub(crate) done: oneshot::Receiver<Result<HttpResponse>>,
}

impl PendingRequest {
    /// Blocks until the owning worker signals completion.
    pub async fn wait(self) -> Result<HttpResponse> {
        match self.done.await {
            Ok(result) => result,
            Err(_) => Err(Error::Internal(
                "request dropped without completion".into(),
            )),
        }
    }

    pub fn state(&self) -> &Arc<RequestState> {
        &self.state
    }
}

/// Producer side of a streaming upload.
///
/// Sending blocks until the worker has drained the previous chunk; this
/// is the pause/resume protocol expressed as channel back-pressure.
pub struct StreamingHandle {
    pub(crate) tx: mpsc::Sender<Chunk>,
    pub(crate) state: Arc<RequestState>,
}

impl StreamingHandle {
    /// Feeds the next body chunk.  `last` declares end of payload.
    pub async fn send(&self, data: Bytes, last: bool) -> Result<()> {
        if self.state.is_timed_out() {
            return Err(Error::Timeout(
                "transfer has timed out due to inactivity".into(),
            ));
        }
        self.state.touch_producer();
        self.tx
            .send(Chunk { data, last })
            .await
            .map_err(|_| Error::Transport("upload stream closed by the worker".into()))
    }
}
