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

//! Per-open file object for the HTTP/WebDAV adapter.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};

use crate::http::commands::{HttpDownload, HttpHead, HttpStreamingUpload, HttpUpload};
use crate::http::fs::HttpFs;
use crate::oss::api::{FileInfo, ObjectFile, OpenEnv};
use crate::oss::error::{Error, Result};

pub struct HttpFile {
    fs: Arc<HttpFs>,
    object: String,
    is_open: bool,
    write: bool,
    /// Declared object size from `oss.asize`; `None` when unknown.
    object_size: Option<i64>,
    write_offset: i64,
    write_op: Option<HttpStreamingUpload>,
    /// Cached (content_length, last_modified) from the first HEAD.
    stat_cache: Option<(i64, i64)>,
}

impl HttpFile {
    pub fn new(fs: Arc<HttpFs>) -> Self {
        HttpFile {
            fs,
            object: String::new(),
            is_open: false,
            write: false,
            object_size: None,
            write_offset: 0,
            write_op: None,
            stat_cache: None,
        }
    }

    fn host_url(&self) -> &str {
        self.fs.cfg.effective_url()
    }

    fn is_directory_object(&self) -> bool {
        self.object.is_empty() || self.object.ends_with('/')
    }

    fn http_error(&self, err: Error, verb: &str) -> Error {
        if let Some(status) = err.http_status() {
            warn!("HTTP {verb} on {} failed with status {status}", self.object);
        } else {
            warn!("HTTP {verb} on {} failed: {err}", self.object);
        }
        err
    }

    /// Open used by `stat`: resolves the object without marking the
    /// handle open.
    pub(crate) async fn open_for_stat(&mut self, path: &str, _env: &OpenEnv) -> Result<()> {
        self.object = self.fs.object_for(path)?;
        Ok(())
    }
}

#[async_trait]
impl ObjectFile for HttpFile {
    async fn open(&mut self, path: &str, oflag: i32, _mode: u32, env: &OpenEnv) -> Result<()> {
        if self.is_open {
            warn!("file already open: {path}");
            return Err(Error::from_errno(libc::EBADF));
        }
        if self.fs.debug_enabled() {
            if oflag & libc::O_CREAT != 0 {
                debug!("file opened for creation: {path}");
            }
            if oflag & libc::O_APPEND != 0 {
                debug!("file opened for append: {path}");
            }
        }
        if oflag & (libc::O_RDWR | libc::O_WRONLY) != 0 {
            self.write = true;
        }
        self.object_size = env.expected_size()?;
        self.object = self.fs.object_for(path)?;

        // A plain read-only open probes existence up front so a missing
        // object surfaces as ENOENT rather than on the first read.
        if oflag == 0 {
            let info = self.fstat().await?;
            if info.is_dir() {
                return Err(Error::from_errno(libc::EISDIR));
            }
        }

        self.is_open = true;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if !self.is_open {
            warn!("read on unopened file");
            return Err(Error::from_errno(libc::EBADF));
        }
        let download = HttpDownload::new(self.host_url(), &self.object, self.fs.token.clone());
        let bytes = download
            .send(&self.fs.engine, offset, buf.len())
            .await
            .map_err(|e| self.http_error(e, "GET"))?;
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }

    async fn fstat(&mut self) -> Result<FileInfo> {
        if let Some((content_length, last_modified)) = self.stat_cache {
            let info = if self.is_directory_object() {
                FileInfo::directory()
            } else {
                FileInfo::regular(content_length, last_modified)
            };
            return Ok(info);
        }

        let head = HttpHead::new(self.host_url(), &self.object, self.fs.token.clone());
        let response = head
            .send(&self.fs.engine)
            .await
            .map_err(|e| self.http_error(e, "HEAD"))?;

        let content_length = response.content_length().unwrap_or(0);
        let last_modified = response.last_modified().unwrap_or(0);
        self.stat_cache = Some((content_length, last_modified));

        Ok(if self.is_directory_object() {
            FileInfo::directory()
        } else {
            FileInfo::regular(content_length, last_modified)
        })
    }

    async fn write(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        if !self.is_open || !self.write {
            warn!("write on unopened or read-only file");
            return Err(Error::from_errno(libc::EBADF));
        }
        let size = buf.len();

        // Small-object fast path: the whole declared object in one PUT.
        if self.write_offset == 0 && self.object_size == Some(size as i64) {
            let upload = HttpUpload::new(self.host_url(), &self.object, self.fs.token.clone());
            upload
                .send(&self.fs.engine, Bytes::copy_from_slice(buf))
                .await
                .map_err(|e| self.http_error(e, "PUT"))?;
            self.write_offset += size as i64;
            if self.fs.debug_enabled() {
                debug!("creation of small object succeeded ({size} bytes)");
            }
            return Ok(size);
        }

        if self.write_op.is_none() {
            if offset != 0 {
                warn!("out-of-order write detected; uploads must start at offset 0");
                return Err(Error::from_errno(libc::EIO));
            }
            self.write_op = Some(
                HttpStreamingUpload::start(
                    &self.fs.engine,
                    self.host_url(),
                    &self.object,
                    self.fs.token.clone(),
                    self.object_size.map(|s| s as u64),
                )
                .await
                .map_err(|e| self.http_error(e, "PUT streaming start"))?,
            );
        } else if offset != self.write_offset as u64 {
            warn!(
                "requested write offset {offset} does not match current cursor {}",
                self.write_offset
            );
            return Err(Error::from_errno(libc::EIO));
        }

        // With a declared size, the chunk that completes it is final.
        let last = self
            .object_size
            .is_some_and(|total| self.write_offset + size as i64 >= total);
        let op = self.write_op.as_mut().expect("streaming upload started");
        let response = op
            .send_chunk(Bytes::copy_from_slice(buf), last)
            .await
            .map_err(|e| self.http_error(e, "PUT streaming continue"))?;
        if response.is_some() {
            self.write_op = None;
        }
        self.write_offset += size as i64;
        Ok(size)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.is_open {
            warn!("cannot close; file is not open");
            return Err(Error::from_errno(libc::EBADF));
        }
        self.is_open = false;

        // Opened for write but nothing written: make a zero-length object
        // so it exists.
        if self.write && self.write_offset == 0 {
            let upload = HttpUpload::new(self.host_url(), &self.object, self.fs.token.clone());
            upload
                .send(&self.fs.engine, Bytes::new())
                .await
                .map_err(|e| self.http_error(e, "PUT zero-length"))?;
            if self.fs.debug_enabled() {
                debug!("creation of zero-length object succeeded");
            }
            return Ok(());
        }

        // Unknown-size streaming upload: terminate the chunked encoding
        // with a final empty chunk.
        if self.write && self.object_size.is_none() {
            if let Some(mut op) = self.write_op.take() {
                op.send_chunk(Bytes::new(), true)
                    .await
                    .map_err(|e| self.http_error(e, "PUT streaming close"))?;
                if self.fs.debug_enabled() {
                    debug!("PUT streaming close succeeded");
                }
            }
        }

        if self.fs.debug_enabled() {
            debug!("closed HTTP file {}", self.object);
        }
        Ok(())
    }
}
