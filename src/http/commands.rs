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

//! Typed HTTP verbs on top of the request engine.
//!
//! Each wrapper pins the verb and the expected response status; anything
//! else is surfaced verbatim as `HttpStatusUnexpected`.

use std::sync::Arc;

use bytes::Bytes;
use http::Method;

use crate::engine::Engine;
use crate::engine::request::{HttpResponse, PendingRequest, Request, RequestBody, StreamingHandle};
use crate::http::token::TokenFile;
use crate::oss::error::{Error, Result};
use crate::oss::multimap::MultimapExt;

/// Joins a base URL and an object name with exactly one separator.
pub fn join_url(host_url: &str, object: &str) -> String {
    if object.is_empty() {
        return host_url.to_string();
    }
    match (host_url.ends_with('/'), object.starts_with('/')) {
        (true, true) => format!("{}{}", host_url, &object[1..]),
        (false, false) => format!("{host_url}/{object}"),
        _ => format!("{host_url}{object}"),
    }
}

fn range_header(offset: u64, size: usize) -> String {
    format!("bytes={}-{}", offset, offset + size as u64 - 1)
}

fn base_request(
    method: Method,
    host_url: &str,
    object: &str,
    token: Option<Arc<TokenFile>>,
) -> Request {
    let mut request = Request::new(method, join_url(host_url, object));
    request.token = token;
    request
}

/// HEAD: expected 200, response headers carried back to the caller.
pub struct HttpHead {
    request: Request,
}

impl HttpHead {
    pub fn new(host_url: &str, object: &str, token: Option<Arc<TokenFile>>) -> Self {
        HttpHead {
            request: base_request(Method::HEAD, host_url, object, token),
        }
    }

    pub async fn send(self, engine: &Engine) -> Result<HttpResponse> {
        engine.execute(self.request, RequestBody::Empty).await
    }
}

/// GET: the whole object (expected 200) or a byte range (expected 206).
pub struct HttpDownload {
    request: Request,
}

impl HttpDownload {
    pub fn new(host_url: &str, object: &str, token: Option<Arc<TokenFile>>) -> Self {
        HttpDownload {
            request: base_request(Method::GET, host_url, object, token),
        }
    }

    /// Fetches `size` bytes starting at `offset`; `(0, 0)` fetches the
    /// whole object.
    pub async fn send(mut self, engine: &Engine, offset: u64, size: usize) -> Result<Bytes> {
        if offset != 0 || size != 0 {
            self.request.headers.add("Range", range_header(offset, size));
            self.request.expected_status = 206;
        }
        let response = engine.execute(self.request, RequestBody::Empty).await?;
        Ok(response.body)
    }
}

/// PUT with the whole payload available up front.  Expected 200.
pub struct HttpUpload {
    request: Request,
}

impl HttpUpload {
    pub fn new(host_url: &str, object: &str, token: Option<Arc<TokenFile>>) -> Self {
        HttpUpload {
            request: base_request(Method::PUT, host_url, object, token),
        }
    }

    pub async fn send(self, engine: &Engine, payload: Bytes) -> Result<HttpResponse> {
        engine.execute(self.request, RequestBody::Full(payload)).await
    }
}

/// Sequential streaming PUT.
///
/// A declared total size sets `Content-Length`; no declared size switches
/// the transfer to chunked encoding, terminated by a final empty chunk.
pub struct HttpStreamingUpload {
    handle: StreamingHandle,
    pending: Option<PendingRequest>,
    sent: u64,
}

impl HttpStreamingUpload {
    pub async fn start(
        engine: &Engine,
        host_url: &str,
        object: &str,
        token: Option<Arc<TokenFile>>,
        total_size: Option<u64>,
    ) -> Result<Self> {
        let request = base_request(Method::PUT, host_url, object, token);
        let (handle, pending) = engine.execute_streaming(request, total_size).await?;
        Ok(HttpStreamingUpload {
            handle,
            pending: Some(pending),
            sent: 0,
        })
    }

    /// Sends the next chunk in submission order.  With `last` set, waits
    /// for the transfer to complete and returns the response.
    pub async fn send_chunk(&mut self, data: Bytes, last: bool) -> Result<Option<HttpResponse>> {
        self.sent += data.len() as u64;
        self.handle.send(data, last).await?;
        if !last {
            return Ok(None);
        }
        let pending = self
            .pending
            .take()
            .ok_or_else(|| Error::Logic("streaming upload already finished".into()))?;
        pending.wait().await.map(Some)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }
}

/// WebDAV PROPFIND with `Depth: 1`.  Expected 207 Multi-Status.
pub struct HttpPropfind {
    request: Request,
}

const PROPFIND_BODY: &str = "<d:propfind xmlns:d=\"DAV:\">\
  <d:prop>\
    <d:resourcetype/>\
    <d:getcontentlength/>\
    <d:getlastmodified/>\
  </d:prop>\
</d:propfind>";

impl HttpPropfind {
    pub fn new(host_url: &str, object: &str, token: Option<Arc<TokenFile>>) -> Self {
        let mut request = base_request(
            Method::from_bytes(b"PROPFIND").expect("valid method"),
            host_url,
            object,
            token,
        );
        request.expected_status = 207;
        request.headers.add("Depth", "1");
        request.headers.add("Content-Type", "application/xml");
        HttpPropfind { request }
    }

    pub async fn send(self, engine: &Engine) -> Result<HttpResponse> {
        engine
            .execute(self.request, RequestBody::Full(Bytes::from_static(PROPFIND_BODY.as_bytes())))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(join_url("http://h", "obj"), "http://h/obj");
        assert_eq!(join_url("http://h/", "obj"), "http://h/obj");
        assert_eq!(join_url("http://h/", "/obj"), "http://h/obj");
        assert_eq!(join_url("http://h", "/obj"), "http://h/obj");
        assert_eq!(join_url("http://h", ""), "http://h");
    }

    #[test]
    fn range_header_is_inclusive() {
        assert_eq!(range_header(0, 12), "bytes=0-11");
        assert_eq!(range_header(100, 50), "bytes=100-149");
    }
}
