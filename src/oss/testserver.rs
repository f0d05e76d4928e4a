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

//! Minimal canned-response HTTP server for the adapter test suites.
//!
//! Serves one connection per configured response (responses carry
//! `Connection: close`) and records every request it saw.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// One request as seen on the wire: the head (request line + headers)
/// and the body bytes (raw, including chunk framing for chunked bodies).
#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub head: String,
    pub body: Vec<u8>,
}

impl SeenRequest {
    pub fn line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn has_header(&self, needle: &str) -> bool {
        self.head.to_lowercase().contains(&needle.to_lowercase())
    }
}

/// Reads one HTTP request off the socket.
pub async fn read_request(sock: &mut TcpStream) -> SeenRequest {
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];
    let header_end = loop {
        if let Some(pos) = find_subslice(&data, b"\r\n\r\n") {
            break pos + 4;
        }
        let n = sock.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed before headers were complete");
        data.extend_from_slice(&buf[..n]);
    };

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let head_lower = head.to_lowercase();
    let mut body = data[header_end..].to_vec();

    if head_lower.contains("transfer-encoding: chunked") {
        while find_subslice(&body, b"0\r\n\r\n").is_none() {
            let n = sock.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before the terminal chunk");
            body.extend_from_slice(&buf[..n]);
        }
    } else {
        let content_length = head_lower
            .lines()
            .find_map(|l| l.strip_prefix("content-length: "))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while body.len() < content_length {
            let n = sock.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before the body was complete");
            body.extend_from_slice(&buf[..n]);
        }
    }
    SeenRequest { head, body }
}

/// Canned response with a body and automatic `Content-Length`.
pub fn response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Canned response with extra header lines (no trailing `\r\n` each).
pub fn response_with(status: &str, headers: &[&str], body: &str) -> String {
    let mut text = format!("HTTP/1.1 {status}\r\n");
    for header in headers {
        text.push_str(header);
        text.push_str("\r\n");
    }
    text.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    ));
    text
}

/// Serves the canned responses in order, one connection each, and
/// returns every request it saw.
pub async fn serve(
    responses: Vec<String>,
) -> (String, tokio::task::JoinHandle<Vec<SeenRequest>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut seen = Vec::new();
        for resp in responses {
            let (mut sock, _) = listener.accept().await.unwrap();
            let req = read_request(&mut sock).await;
            seen.push(req);
            sock.write_all(resp.as_bytes()).await.unwrap();
            sock.shutdown().await.unwrap();
        }
        seen
    });
    (format!("http://{addr}"), handle)
}
