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

//! Per-open file object for the S3 adapter.
//!
//! Writes are strictly sequential.  The first write picks the upload
//! strategy: a single PUT when the declared size fits in one shot, or a
//! multipart upload that buffers to the configured part size.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use log::{debug, error, warn};

use crate::oss::api::{FileInfo, ObjectFile, OpenEnv};
use crate::oss::error::{Error, Result};
use crate::s3::access_info::S3AccessInfo;
use crate::s3::commands::{
    S3AbortMultipartUpload, S3CompleteMultipartUpload, S3CreateMultipartUpload, S3Download,
    S3Head, S3SendMultipartPart, S3Upload,
};
use crate::s3::fs::S3Fs;

/// Default multipart part size in bytes.
pub const DEFAULT_PART_SIZE: usize = 100_000_000;

/// In-progress multipart upload: the server-issued id, the ETags in
/// part order, and the bytes not yet flushed as a part.
struct MultipartUpload {
    upload_id: String,
    etags: Vec<String>,
    next_part: usize,
    buffer: BytesMut,
}

pub struct S3File {
    fs: Arc<S3Fs>,
    ai: Option<S3AccessInfo>,
    object: String,
    is_open: bool,
    write: bool,
    object_size: Option<i64>,
    write_offset: i64,
    upload: Option<MultipartUpload>,
    stat_cache: Option<(i64, i64)>,
}

impl S3File {
    pub fn new(fs: Arc<S3Fs>) -> Self {
        S3File {
            fs,
            ai: None,
            object: String::new(),
            is_open: false,
            write: false,
            object_size: None,
            write_offset: 0,
            upload: None,
            stat_cache: None,
        }
    }

    fn access_info(&self) -> Result<&S3AccessInfo> {
        self.ai
            .as_ref()
            .ok_or_else(|| Error::from_errno(libc::EBADF))
    }

    async fn flush_part(&mut self) -> Result<()> {
        let ai = self.ai.clone().ok_or(Error::from_errno(libc::EBADF))?;
        let upload = self
            .upload
            .as_mut()
            .ok_or_else(|| Error::Logic("no multipart upload in progress".into()))?;
        let part = upload.buffer.split().freeze();
        let part_number = upload.next_part;
        let etag = S3SendMultipartPart::new(&ai, &self.object)?
            .send(&self.fs.engine, part, part_number, &upload.upload_id)
            .await?;
        upload.etags.push(etag);
        upload.next_part += 1;
        if self.fs.debug_enabled() {
            debug!("uploaded part {part_number} of {}", self.object);
        }
        Ok(())
    }

    /// Best-effort abort of a failed multipart upload.
    async fn abort_upload(&mut self) {
        let Some(upload) = self.upload.take() else {
            return;
        };
        let Some(ai) = self.ai.clone() else {
            return;
        };
        let abort = match S3AbortMultipartUpload::new(&ai, &self.object) {
            Ok(abort) => abort,
            Err(e) => {
                error!("failed to build abort request for {}: {e}", self.object);
                return;
            }
        };
        if let Err(e) = abort.send(&self.fs.engine, &upload.upload_id).await {
            error!("failed to abort multipart upload of {}: {e}", self.object);
        }
    }
}

#[async_trait]
impl ObjectFile for S3File {
    async fn open(&mut self, path: &str, oflag: i32, _mode: u32, env: &OpenEnv) -> Result<()> {
        if self.is_open {
            warn!("file already open: {path}");
            return Err(Error::from_errno(libc::EBADF));
        }
        let (exposed, mut object) = self.fs.parse_path(path)?;
        let ai = self.fs.access_info(&exposed, &mut object)?;

        if oflag & (libc::O_RDWR | libc::O_WRONLY) != 0 {
            self.write = true;
        }
        self.object_size = env.expected_size()?;
        self.ai = Some(ai);
        self.object = object;

        // A plain read-only open probes for existence so a missing object
        // is reported up front.
        if oflag == 0 {
            let ai = self.access_info()?.clone();
            S3Head::new(&ai, &self.object)?
                .send(&self.fs.engine)
                .await
                .map_err(|_| Error::from_errno(libc::ENOENT))?;
        }

        self.is_open = true;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if !self.is_open {
            return Err(Error::from_errno(libc::EBADF));
        }
        let ai = self.access_info()?.clone();
        let bytes = S3Download::new(&ai, &self.object)?
            .send(&self.fs.engine, offset, buf.len())
            .await
            .map_err(|e| {
                warn!("failed to send GetObject command: {e}");
                e
            })?;
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }

    async fn fstat(&mut self) -> Result<FileInfo> {
        if let Some((size, mtime)) = self.stat_cache {
            return Ok(FileInfo::regular(size, mtime));
        }
        let ai = self.access_info()?.clone();
        let response = S3Head::new(&ai, &self.object)?
            .send(&self.fs.engine)
            .await
            .map_err(|e| {
                warn!("failed to send HeadObject command: {e}");
                e
            })?;
        let size = response.content_length().unwrap_or(0);
        let mtime = response.last_modified().unwrap_or(0);
        self.stat_cache = Some((size, mtime));
        Ok(FileInfo::regular(size, mtime))
    }

    async fn write(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        if !self.is_open || !self.write {
            return Err(Error::from_errno(libc::EBADF));
        }
        if offset != self.write_offset as u64 {
            warn!(
                "out-of-order write at offset {offset}; expected {}",
                self.write_offset
            );
            return Err(Error::from_errno(libc::EIO));
        }
        let size = buf.len();
        let ai = self.access_info()?.clone();

        // Small-object fast path: the declared size arrives in a single
        // write, so one PUT suffices and multipart is skipped.
        if self.write_offset == 0 && self.upload.is_none() && self.object_size == Some(size as i64)
        {
            S3Upload::new(&ai, &self.object)?
                .send(&self.fs.engine, Bytes::copy_from_slice(buf))
                .await
                .map_err(|e| {
                    warn!("small-object PUT of {} failed: {e}", self.object);
                    e
                })?;
            self.write_offset += size as i64;
            if self.fs.debug_enabled() {
                debug!("creation of small object {} succeeded", self.object);
            }
            return Ok(size);
        }

        if self.upload.is_none() {
            let upload_id = S3CreateMultipartUpload::new(&ai, &self.object)?
                .send(&self.fs.engine)
                .await?;
            if self.fs.debug_enabled() {
                debug!("initiated multipart upload {upload_id} for {}", self.object);
            }
            self.upload = Some(MultipartUpload {
                upload_id,
                etags: Vec::new(),
                next_part: 1,
                buffer: BytesMut::new(),
            });
        }

        let part_size = self.fs.part_size;
        self.upload
            .as_mut()
            .expect("multipart upload started")
            .buffer
            .extend_from_slice(buf);
        while self
            .upload
            .as_ref()
            .is_some_and(|u| u.buffer.len() >= part_size)
        {
            if let Err(e) = self.flush_part().await {
                self.abort_upload().await;
                return Err(e);
            }
        }

        self.write_offset += size as i64;
        Ok(size)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.is_open {
            return Err(Error::from_errno(libc::EBADF));
        }
        self.is_open = false;

        if !self.write {
            return Ok(());
        }
        let ai = self.access_info()?.clone();

        // Nothing ever written: materialize the object as zero-length.
        if self.upload.is_none() {
            if self.write_offset == 0 {
                S3Upload::new(&ai, &self.object)?
                    .send(&self.fs.engine, Bytes::new())
                    .await
                    .map_err(|e| {
                        warn!("zero-length PUT of {} failed: {e}", self.object);
                        e
                    })?;
                if self.fs.debug_enabled() {
                    debug!("creation of zero-length object {} succeeded", self.object);
                }
            }
            return Ok(());
        }

        // Flush the remainder as the final part, then assemble.
        if self
            .upload
            .as_ref()
            .is_some_and(|u| !u.buffer.is_empty() || u.etags.is_empty())
        {
            if let Err(e) = self.flush_part().await {
                self.abort_upload().await;
                return Err(e);
            }
        }
        let upload = self.upload.take().expect("multipart upload in progress");
        match S3CompleteMultipartUpload::new(&ai, &self.object)?
            .send(&self.fs.engine, &upload.etags, &upload.upload_id)
            .await
        {
            Ok(_) => {
                if self.fs.debug_enabled() {
                    debug!(
                        "completed multipart upload of {} ({} parts, {} bytes)",
                        self.object,
                        upload.etags.len(),
                        self.write_offset
                    );
                }
                Ok(())
            }
            Err(e) => {
                self.upload = Some(upload);
                self.abort_upload().await;
                Err(e)
            }
        }
    }
}
