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

//! Persist-on-successful-close wrapper.
//!
//! Creates are staged into a hidden per-user scratch area inside the
//! wrapped storage and promoted to their final path only on a clean
//! close.  Everything under the scratch root is invisible to callers,
//! and a background task expires scratch files abandoned by crashed or
//! stalled writers.

pub mod dir;
pub mod file;

use std::sync::Arc;
use std::sync::atomic::AtomicI64;

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, error, warn};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::oss::api::{FileInfo, Identity, ObjectDir, ObjectFile, ObjectFs, OpenEnv};
use crate::oss::config::ConfigDoc;
use crate::oss::error::{Error, Result};
use crate::oss::logging::LogMask;
use crate::posc::dir::PoscDir;
use crate::posc::file::PoscFile;

/// Scratch files are named `in_progress.<epochSeconds>.<rand6>`.
pub(crate) const SCRATCH_PREFIX: &str = "in_progress.";

/// Mtime refresh horizon for files still being written slowly.
const FILE_UPDATE_HORIZON: std::time::Duration = std::time::Duration::from_secs(19 * 60);
/// Scratch files whose mtime is older than this are swept.
const FILE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60 * 60);
/// Cadence of the expiry task.
const EXPIRY_PERIOD: std::time::Duration = std::time::Duration::from_secs(5);

const READDIR_NAME_MAX: usize = 255;

#[derive(Clone, Debug, Default)]
pub struct PoscConfig {
    /// Absolute scratch root inside the wrapped storage.
    pub prefix: String,
    pub mask: LogMask,
    pub file_timeout: std::time::Duration,
}

impl PoscConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        PoscConfig {
            prefix: prefix.into(),
            mask: LogMask::default_mask(),
            file_timeout: FILE_TIMEOUT,
        }
    }

    pub fn from_config(doc: &ConfigDoc) -> Result<Self> {
        let mut cfg = PoscConfig {
            file_timeout: FILE_TIMEOUT,
            mask: LogMask::default_mask(),
            ..Default::default()
        };
        for directive in doc.section("posc") {
            match directive.key.as_str() {
                "posc.prefix" => cfg.prefix = directive.require_arg()?.to_string(),
                "posc.trace" => {
                    cfg.mask = LogMask::parse_levels(directive.args.iter().map(String::as_str))?
                }
                other => {
                    return Err(Error::Config(format!(
                        "unknown configuration directive {other}"
                    )));
                }
            }
        }
        if cfg.prefix.is_empty() {
            return Err(Error::Config(
                "no POSC temporary directory specified but one is required; \
                 usage: posc.prefix posc_directory"
                    .into(),
            ));
        }
        if !cfg.prefix.starts_with('/') {
            return Err(Error::Config(
                "posc.prefix requires an absolute path".into(),
            ));
        }
        Ok(cfg)
    }
}

/// A tracked open scratch file.
pub(crate) struct PoscRecord {
    pub(crate) scratch_path: String,
    /// Nanoseconds since the epoch of the last write, loadable without
    /// any table lock.
    pub(crate) last_touch: AtomicI64,
    /// Shared handle to the underlying file so the refresh task can
    /// advance its mtime.
    pub(crate) inner: Arc<tokio::sync::Mutex<Box<dyn ObjectFile>>>,
}

pub(crate) fn now_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or_default()
}

pub(crate) fn now_secs() -> i64 {
    now_nanos() / 1_000_000_000
}

/// The POSC filesystem wrapper.
pub struct PoscFs {
    pub(crate) inner: Arc<dyn ObjectFs>,
    posc_dir: String,
    cfg: PoscConfig,
    pub(crate) open_files: DashMap<u64, Arc<PoscRecord>>,
    next_handle: std::sync::atomic::AtomicU64,
    shutdown: Notify,
    expiry_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PoscFs {
    /// Validates (and creates, if absent) the scratch root, then starts
    /// the expiry task.
    pub async fn start(inner: Arc<dyn ObjectFs>, cfg: PoscConfig) -> Result<Arc<Self>> {
        let env = OpenEnv::new();
        match inner.stat(&cfg.prefix, 0, &env).await {
            Ok(info) if !info.is_dir() => {
                return Err(Error::Config(format!(
                    "POSC directory {} is not a directory",
                    cfg.prefix
                )));
            }
            Ok(_) => {}
            Err(e) if e.errno() == libc::ENOENT => {
                warn!("POSC directory {} does not exist; creating it", cfg.prefix);
                inner.mkdir(&cfg.prefix, 0o755, true, &env).await.map_err(|e| {
                    Error::Config(format!(
                        "failed to create POSC directory {}: {e}",
                        cfg.prefix
                    ))
                })?;
            }
            Err(e) => {
                return Err(Error::Config(format!(
                    "POSC directory {} is not accessible: {e}",
                    cfg.prefix
                )));
            }
        }

        let fs = Arc::new(PoscFs {
            inner,
            posc_dir: cfg.prefix.trim_end_matches('/').to_string(),
            cfg,
            open_files: DashMap::new(),
            next_handle: std::sync::atomic::AtomicU64::new(1),
            shutdown: Notify::new(),
            expiry_task: std::sync::Mutex::new(None),
        });

        let task_fs = Arc::clone(&fs);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(EXPIRY_PERIOD) => {}
                    _ = task_fs.shutdown.notified() => break,
                }
                task_fs.update_open_files().await;
                task_fs.expire_files().await;
            }
            if task_fs.debug_enabled() {
                debug!("POSC expiry task stopped");
            }
        });
        *fs.expiry_task.lock().unwrap() = Some(handle);

        if fs.debug_enabled() {
            debug!("POSC filesystem initialized with scratch root {}", fs.posc_dir);
        }
        Ok(fs)
    }

    /// Signals the expiry task to stop and joins it.
    pub async fn shutdown(&self) {
        let handle = self.expiry_task.lock().unwrap().take();
        if let Some(handle) = handle {
            self.shutdown.notify_one();
            let _ = handle.await;
        }
    }

    pub(crate) fn debug_enabled(&self) -> bool {
        self.cfg.mask.debug_enabled()
    }

    /// Whether the path resolves inside the scratch root, judged
    /// component by component.
    pub(crate) fn in_posc_dir(&self, path: &str) -> bool {
        let posc: Vec<&str> = self.posc_dir.split('/').filter(|c| !c.is_empty()).collect();
        let parts: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        parts.len() >= posc.len() && parts[..posc.len()] == posc[..]
    }

    /// New scratch path under the caller's user directory.
    pub(crate) fn generate_scratch_path(&self, env: &OpenEnv) -> String {
        let user = env
            .identity()
            .and_then(Identity::user)
            .unwrap_or("anonymous");
        format!(
            "{}/{}/{}{}.{:06}",
            self.posc_dir,
            user,
            SCRATCH_PREFIX,
            now_secs(),
            rand::random::<u32>() % 1_000_000
        )
    }

    pub(crate) fn track(&self, record: Arc<PoscRecord>) -> u64 {
        let id = self
            .next_handle
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.open_files.insert(id, record);
        id
    }

    pub(crate) fn untrack(&self, id: u64) {
        self.open_files.remove(&id);
    }

    /// Advances the storage mtime of live files that have not been
    /// written for the refresh horizon, so the sweep cannot collect
    /// slow writers.
    pub(crate) async fn update_open_files(&self) {
        let now = now_nanos();
        let horizon = FILE_UPDATE_HORIZON.as_nanos() as i64;
        let records: Vec<Arc<PoscRecord>> = self
            .open_files
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        for record in records {
            let last = record.last_touch.load(std::sync::atomic::Ordering::Relaxed);
            if now - last <= horizon {
                continue;
            }
            record
                .last_touch
                .store(now, std::sync::atomic::Ordering::Relaxed);
            let mut file = record.inner.lock().await;
            match file.utimes(now / 1_000_000_000).await {
                Ok(()) => {
                    if self.debug_enabled() {
                        debug!("updated POSC file mtime for {}", record.scratch_path);
                    }
                }
                Err(e) => error!(
                    "failed to update POSC file mtime for {}: {e}",
                    record.scratch_path
                ),
            }
        }
    }

    /// Sweeps the scratch root: every user directory is scanned for
    /// `in_progress.*` entries older than the file timeout.
    pub(crate) async fn expire_files(&self) {
        let env = OpenEnv::new();
        let mut dir = self.inner.new_dir();
        if let Err(e) = dir.opendir(&self.posc_dir, &env).await {
            error!("failed to open POSC directory {}: {e}", self.posc_dir);
            return;
        }
        let mut users = Vec::new();
        loop {
            match dir.readdir(READDIR_NAME_MAX).await {
                Ok(Some(entry)) => {
                    if entry.name.starts_with('.') {
                        continue;
                    }
                    users.push(entry.name);
                }
                Ok(None) => break,
                Err(e) => {
                    error!("error reading POSC directory {}: {e}", self.posc_dir);
                    break;
                }
            }
        }
        let _ = dir.close().await;

        for user in users {
            let user_env = OpenEnv::with_identity(Identity::named(user.clone()));
            let path = format!("{}/{}", self.posc_dir, user);
            match self.inner.stat(&path, 0, &user_env).await {
                Ok(info) if info.is_dir() => self.expire_user_files(&user, &user_env).await,
                Ok(_) => {}
                Err(e) => warn!("failed to stat {path} while scanning POSC directory: {e}"),
            }
        }
    }

    async fn expire_user_files(&self, user: &str, env: &OpenEnv) {
        let user_dir = format!("{}/{}", self.posc_dir, user);
        if self.debug_enabled() {
            debug!("expiring stale files inside {user_dir}");
        }

        let mut dir = self.inner.new_dir();
        if let Err(e) = dir.opendir(&user_dir, env).await {
            error!("failed to open POSC user directory {user_dir}: {e}");
            return;
        }
        let supports_stat_ret = dir.stat_ret();
        let mut stale = Vec::new();
        let oldest_acceptable = now_secs() - self.cfg.file_timeout.as_secs() as i64;
        loop {
            let entry = match dir.readdir(READDIR_NAME_MAX).await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    error!("error reading POSC user directory {user_dir}: {e}");
                    break;
                }
            };
            if !entry.name.starts_with(SCRATCH_PREFIX) {
                continue;
            }
            let path = format!("{user_dir}/{}", entry.name);
            let info = if supports_stat_ret {
                entry.info
            } else {
                match self.inner.stat(&path, 0, env).await {
                    Ok(info) => Some(info),
                    Err(e) => {
                        warn!("failed to stat POSC file {path}: {e}");
                        continue;
                    }
                }
            };
            let Some(info) = info else { continue };
            if info.is_dir() {
                continue;
            }
            if info.mtime >= oldest_acceptable {
                // Still in use.
                continue;
            }
            stale.push(path);
        }
        let _ = dir.close().await;

        for path in stale {
            match self.inner.unlink(&path, 0, env).await {
                Ok(()) => {
                    if self.debug_enabled() {
                        debug!("removed stale POSC file {path}");
                    }
                }
                Err(e) => error!("failed to remove stale POSC file {path}: {e}"),
            }
        }
    }

    fn verify_path(&self, path: &str) -> Result<()> {
        if self.in_posc_dir(path) {
            if self.debug_enabled() {
                debug!("path {path} is inside the POSC directory; returning ENOENT");
            }
            return Err(Error::from_errno(libc::ENOENT));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectFs for Arc<PoscFs> {
    fn new_file(&self) -> Box<dyn ObjectFile> {
        Box::new(PoscFile::new(Arc::clone(self), self.inner.new_file()))
    }

    fn new_dir(&self) -> Box<dyn ObjectDir> {
        Box::new(PoscDir::new(Arc::clone(self), self.inner.new_dir()))
    }

    async fn stat(&self, path: &str, opts: i32, env: &OpenEnv) -> Result<FileInfo> {
        self.verify_path(path)?;
        self.inner.stat(path, opts, env).await
    }

    async fn create(
        &self,
        tid: &str,
        path: &str,
        mode: u32,
        env: &OpenEnv,
        opts: i32,
    ) -> Result<()> {
        // Open flags ride in opts >> 8.  When the open will create or
        // truncate, the scratch machinery owns file creation; creating
        // the final path here would expose an empty file mid-upload.
        let open_flags = opts >> 8;
        if open_flags & (libc::O_CREAT | libc::O_TRUNC) != 0 {
            if self.debug_enabled() {
                debug!("skipping Create for POSC-handled file {path}");
            }
            return Ok(());
        }
        self.verify_path(path)?;
        self.inner.create(tid, path, mode, env, opts).await
    }

    async fn mkdir(&self, path: &str, mode: u32, mkpath: bool, env: &OpenEnv) -> Result<()> {
        // ENOENT would point at the parent here; report EIO instead.
        if self.in_posc_dir(path) {
            if self.debug_enabled() {
                debug!("mkdir {path} is inside the POSC directory; returning EIO");
            }
            return Err(Error::from_errno(libc::EIO));
        }
        self.inner.mkdir(path, mode, mkpath, env).await
    }

    async fn remdir(&self, path: &str, opts: i32, env: &OpenEnv) -> Result<()> {
        self.verify_path(path)?;
        self.inner.remdir(path, opts, env).await
    }

    async fn rename(&self, from: &str, to: &str, env: &OpenEnv) -> Result<()> {
        self.verify_path(from)?;
        self.verify_path(to)?;
        self.inner.rename(from, to, env).await
    }

    async fn unlink(&self, path: &str, opts: i32, env: &OpenEnv) -> Result<()> {
        self.verify_path(path)?;
        self.inner.unlink(path, opts, env).await
    }

    async fn truncate(&self, path: &str, size: u64, env: &OpenEnv) -> Result<()> {
        self.verify_path(path)?;
        self.inner.truncate(path, size, env).await
    }

    async fn chmod(&self, path: &str, mode: u32, env: &OpenEnv) -> Result<()> {
        self.verify_path(path)?;
        self.inner.chmod(path, mode, env).await
    }

    fn lfn2pfn(&self, path: &str) -> Result<String> {
        self.verify_path(path)?;
        self.inner.lfn2pfn(path)
    }
}
