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

//! Per-open POSC file: writes land in the scratch file, promotion
//! happens on clean close, and every failure path unlinks the scratch.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use log::{debug, error};
use tokio::sync::Mutex;

use crate::oss::api::{FileInfo, ObjectFile, OpenEnv};
use crate::oss::error::{Error, Result};
use crate::posc::{PoscFs, PoscRecord, now_nanos};

const OPEN_RETRIES: usize = 10;

pub struct PoscFile {
    fs: Arc<PoscFs>,
    inner: Arc<Mutex<Box<dyn ObjectFile>>>,
    record: Option<Arc<PoscRecord>>,
    handle_id: Option<u64>,
    scratch_path: Option<String>,
    final_path: String,
    requested_mode: u32,
    expected_size: Option<i64>,
    /// Identity snapshot taken at open; the promotion path never
    /// touches the caller's environment again.
    env: OpenEnv,
}

impl PoscFile {
    pub fn new(fs: Arc<PoscFs>, inner: Box<dyn ObjectFile>) -> Self {
        PoscFile {
            fs,
            inner: Arc::new(Mutex::new(inner)),
            record: None,
            handle_id: None,
            scratch_path: None,
            final_path: String::new(),
            requested_mode: 0,
            expected_size: None,
            env: OpenEnv::new(),
        }
    }

    fn touch(&self) {
        if let Some(record) = &self.record {
            record.last_touch.store(now_nanos(), Ordering::Relaxed);
        }
    }

    /// Unlinks the scratch file and drops the tracking record.
    async fn discard_scratch(&mut self) {
        if let Some(id) = self.handle_id.take() {
            self.fs.untrack(id);
        }
        self.record = None;
        if let Some(scratch) = self.scratch_path.take() {
            if let Err(e) = self.fs.inner.unlink(&scratch, 0, &self.env).await {
                error!("failed to unlink POSC scratch file {scratch}: {e}");
            }
        }
    }

    async fn ensure_parent_exists(&self, path: &str, env: &OpenEnv) -> Result<()> {
        let Some(idx) = path.rfind('/') else {
            return Ok(());
        };
        let parent = &path[..idx];
        if parent.is_empty() {
            return Ok(());
        }
        match self.fs.inner.stat(parent, 0, env).await {
            Ok(info) if info.is_dir() => Ok(()),
            Ok(_) => {
                if self.fs.debug_enabled() {
                    debug!("failing file open as parent path {parent} is not a directory");
                }
                Err(Error::from_errno(libc::ENOENT))
            }
            Err(e) if e.errno() == libc::ENOENT => {
                if self.fs.debug_enabled() {
                    debug!("parent path {parent} does not exist; creating it");
                }
                self.fs.inner.mkdir(parent, 0o755, true, env).await.map_err(|e| {
                    error!("failed to create parent path {parent}: {e}");
                    e
                })
            }
            Err(e) => {
                if self.fs.debug_enabled() {
                    debug!("failing file open as parent path {parent} is not accessible");
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ObjectFile for PoscFile {
    async fn open(&mut self, path: &str, oflag: i32, mode: u32, env: &OpenEnv) -> Result<()> {
        if self.fs.in_posc_dir(path) {
            if self.fs.debug_enabled() {
                debug!("failing file open as {path} is in the POSC directory");
            }
            return Err(Error::from_errno(libc::ENOENT));
        }

        if oflag & (libc::O_CREAT | libc::O_TRUNC) == 0 {
            return self.inner.lock().await.open(path, oflag, mode, env).await;
        }

        self.ensure_parent_exists(path, env).await?;

        // Snapshot only what the promotion path needs.
        self.env = env.clone();
        self.requested_mode = mode;
        self.expected_size = env.expected_size()?;
        if let Some(size) = self.expected_size {
            if self.fs.debug_enabled() {
                debug!("expected file size: {size}");
            }
        }

        for _ in 0..OPEN_RETRIES {
            let scratch = self.fs.generate_scratch_path(env);
            let open_result = self
                .inner
                .lock()
                .await
                .open(&scratch, oflag | libc::O_EXCL | libc::O_CREAT, 0o600, env)
                .await;
            match open_result {
                Ok(()) => {
                    if self.fs.debug_enabled() {
                        debug!("opened POSC file {scratch}");
                    }
                    self.final_path = path.to_string();
                    self.scratch_path = Some(scratch.clone());
                    let record = Arc::new(PoscRecord {
                        scratch_path: scratch,
                        last_touch: AtomicI64::new(now_nanos()),
                        inner: Arc::clone(&self.inner),
                    });
                    self.handle_id = Some(self.fs.track(Arc::clone(&record)));
                    self.record = Some(record);
                    return Ok(());
                }
                Err(e) if e.errno() == libc::ENOENT => {
                    // The per-user scratch directory does not exist yet.
                    let user_dir = scratch[..scratch.rfind('/').unwrap_or(0)].to_string();
                    if self.fs.debug_enabled() {
                        debug!("POSC sub-directory is needed for file creation: {user_dir}");
                    }
                    if let Err(mkdir_err) =
                        self.fs.inner.mkdir(&user_dir, 0o700, true, env).await
                    {
                        error!("failed to create POSC sub-directory {user_dir}: {mkdir_err}");
                        return Err(Error::from_errno(libc::EIO));
                    }
                }
                Err(e) if e.errno() == libc::EINTR => {
                    if self.fs.debug_enabled() {
                        debug!("POSC file creation interrupted; retrying {scratch}");
                    }
                }
                Err(e) if e.errno() == libc::EEXIST => {
                    if self.fs.debug_enabled() {
                        debug!("temporary POSC file already exists; trying again: {scratch}");
                    }
                }
                Err(e) => {
                    error!("failed to open POSC file {scratch}: {e}");
                    return Err(Error::from_errno(libc::EIO));
                }
            }
        }
        Err(Error::from_errno(libc::EIO))
    }

    async fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.inner.lock().await.read(buf, offset).await
    }

    async fn write(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        self.touch();
        self.inner.lock().await.write(buf, offset).await
    }

    async fn fstat(&mut self) -> Result<FileInfo> {
        self.inner.lock().await.fstat().await
    }

    async fn utimes(&mut self, mtime: i64) -> Result<()> {
        self.inner.lock().await.utimes(mtime).await
    }

    async fn close(&mut self) -> Result<()> {
        let Some(scratch) = self.scratch_path.clone() else {
            return self.inner.lock().await.close().await;
        };

        let close_result = self.inner.lock().await.close().await;
        if let Err(e) = close_result {
            self.discard_scratch().await;
            return Err(e);
        }

        if let Err(e) = self
            .fs
            .inner
            .chmod(&scratch, self.requested_mode, &self.env)
            .await
        {
            error!("failed to set POSC file mode on {scratch}: {e}");
            self.discard_scratch().await;
            return Err(Error::from_errno(libc::EIO));
        }

        // The expected size is advisory; when present, the staged file
        // must match it exactly before it may be promoted.
        if let Some(expected) = self.expected_size {
            let info = match self.fs.inner.stat(&scratch, 0, &self.env).await {
                Ok(info) => info,
                Err(e) => {
                    error!("failed to stat POSC file {scratch}: {e}");
                    self.discard_scratch().await;
                    return Err(Error::from_errno(libc::EIO));
                }
            };
            if info.size != expected {
                error!(
                    "POSC file {scratch} has size {} but {expected} was expected",
                    info.size
                );
                self.discard_scratch().await;
                return Err(Error::from_errno(libc::EIO));
            }
        }

        if let Err(e) = self
            .fs
            .inner
            .rename(&scratch, &self.final_path, &self.env)
            .await
        {
            error!(
                "failed to rename POSC file {scratch} to {}: {e}",
                self.final_path
            );
            self.discard_scratch().await;
            return Err(Error::from_errno(libc::EIO));
        }

        if let Some(id) = self.handle_id.take() {
            self.fs.untrack(id);
        }
        self.record = None;
        self.scratch_path = None;
        Ok(())
    }
}
