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

//! The storage surface the adapters implement and the wrappers compose
//! around.
//!
//! All operations return [`Result`]; failures translate to negated POSIX
//! errno values via [`Error::neg_errno`](crate::oss::error::Error::neg_errno)
//! at the host boundary.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::oss::error::{Error, Result};

/// Key for the advisory expected object size in an [`OpenEnv`].
pub const OSS_ASIZE: &str = "oss.asize";

/// Stat information reported by the adapters.
///
/// Field layout mirrors the subset of `struct stat` the host framework
/// consumes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub mode: u32,
    pub size: i64,
    pub mtime: i64,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub dev: u64,
    pub ino: u64,
}

impl FileInfo {
    /// A regular object entry of the given size and modification time.
    pub fn regular(size: i64, mtime: i64) -> Self {
        FileInfo {
            mode: 0o600 | libc::S_IFREG as u32,
            size,
            mtime,
            nlink: 1,
            uid: 1,
            gid: 1,
            dev: 0,
            ino: 0,
        }
    }

    /// A directory-like pseudo entry.
    ///
    /// Both `st_dev` and `st_ino` zero means "unavailable" to the host, so
    /// the inode is pinned to 1.
    pub fn directory() -> Self {
        FileInfo {
            mode: 0o700 | libc::S_IFDIR as u32,
            size: 4096,
            mtime: 0,
            nlink: 0,
            uid: 1,
            gid: 1,
            dev: 0,
            ino: 1,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & libc::S_IFMT as u32 == libc::S_IFDIR as u32
    }

    pub fn is_regular(&self) -> bool {
        self.mode & libc::S_IFMT as u32 == libc::S_IFREG as u32
    }
}

/// Snapshot of the authenticated caller.
///
/// Only the fields the adapters actually consume are captured, by value;
/// no host object outlives the callback that provided it.
#[derive(Clone, Debug, Default)]
pub struct Identity {
    pub name: Option<String>,
    pub groups: Vec<String>,
    pub endorsements: Option<String>,
}

impl Identity {
    pub fn named(name: impl Into<String>) -> Self {
        Identity {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// User name for namespacing scratch areas; empty names count as unset.
    pub fn user(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.is_empty())
    }
}

/// Opaque key-value environment accompanying each operation, together with
/// the caller's security identity.
#[derive(Clone, Debug, Default)]
pub struct OpenEnv {
    attrs: HashMap<String, String>,
    identity: Option<Identity>,
}

impl OpenEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(identity: Identity) -> Self {
        OpenEnv {
            attrs: HashMap::new(),
            identity: Some(identity),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn set_identity(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    /// Advisory expected object size from `oss.asize`.
    ///
    /// Returns `Ok(None)` when unset.  Negative or unparseable values fail
    /// the operation with `EIO`, matching the adapters' open contract.
    pub fn expected_size(&self) -> Result<Option<i64>> {
        let Some(raw) = self.get(OSS_ASIZE) else {
            return Ok(None);
        };
        match raw.parse::<i64>() {
            Ok(size) if size >= 0 => Ok(Some(size)),
            _ => {
                log::warn!("oss.asize set to an unusable value: {raw}");
                Err(Error::from_errno(libc::EIO))
            }
        }
    }
}

/// One entry produced by [`ObjectDir::readdir`].
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    /// Populated when the stat-return protocol has been enabled and the
    /// adapter can supply the information without extra requests.
    pub info: Option<FileInfo>,
}

impl DirEntry {
    pub fn new(name: impl Into<String>) -> Self {
        DirEntry {
            name: name.into(),
            info: None,
        }
    }

    pub fn with_info(name: impl Into<String>, info: FileInfo) -> Self {
        DirEntry {
            name: name.into(),
            info: Some(info),
        }
    }
}

/// A storage system exposing a file-oriented namespace.
#[async_trait]
pub trait ObjectFs: Send + Sync {
    fn new_file(&self) -> Box<dyn ObjectFile>;

    fn new_dir(&self) -> Box<dyn ObjectDir>;

    async fn stat(&self, path: &str, opts: i32, env: &OpenEnv) -> Result<FileInfo>;

    /// Pre-creation hook invoked before a file is opened for writing.
    ///
    /// The open flags ride in `opts >> 8`, as on the host surface.
    async fn create(
        &self,
        _tid: &str,
        _path: &str,
        _mode: u32,
        _env: &OpenEnv,
        _opts: i32,
    ) -> Result<()> {
        Ok(())
    }

    async fn mkdir(&self, _path: &str, _mode: u32, _mkpath: bool, _env: &OpenEnv) -> Result<()> {
        Err(Error::NotImplemented("mkdir".into()))
    }

    async fn remdir(&self, _path: &str, _opts: i32, _env: &OpenEnv) -> Result<()> {
        Err(Error::NotImplemented("remdir".into()))
    }

    async fn rename(&self, _from: &str, _to: &str, _env: &OpenEnv) -> Result<()> {
        Err(Error::NotImplemented("rename".into()))
    }

    async fn unlink(&self, _path: &str, _opts: i32, _env: &OpenEnv) -> Result<()> {
        Err(Error::NotImplemented("unlink".into()))
    }

    async fn truncate(&self, _path: &str, _size: u64, _env: &OpenEnv) -> Result<()> {
        Err(Error::NotImplemented("truncate".into()))
    }

    async fn chmod(&self, _path: &str, _mode: u32, _env: &OpenEnv) -> Result<()> {
        Err(Error::NotImplemented("chmod".into()))
    }

    /// Logical-to-physical name translation.  Identity unless a name
    /// mapper is stacked on top.
    fn lfn2pfn(&self, path: &str) -> Result<String> {
        Ok(path.to_string())
    }
}

/// A per-open file object.
#[async_trait]
pub trait ObjectFile: Send {
    async fn open(&mut self, path: &str, oflag: i32, mode: u32, env: &OpenEnv) -> Result<()>;

    async fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize>;

    async fn write(&mut self, buf: &[u8], offset: u64) -> Result<usize>;

    async fn fstat(&mut self) -> Result<FileInfo>;

    /// Advances the object's modification time.  Only meaningful for
    /// adapters backed by mutable stores; used by the POSC refresh task.
    async fn utimes(&mut self, _mtime: i64) -> Result<()> {
        Err(Error::NotImplemented("utimes".into()))
    }

    async fn close(&mut self) -> Result<()>;
}

/// A per-open directory object.
#[async_trait]
pub trait ObjectDir: Send {
    async fn opendir(&mut self, path: &str, env: &OpenEnv) -> Result<()>;

    /// Returns the next entry, or `None` at end of listing.
    ///
    /// Entry names longer than `max_name` fail with `ENOMEM`, matching the
    /// fixed-buffer host contract.
    async fn readdir(&mut self, max_name: usize) -> Result<Option<DirEntry>>;

    /// Enables the stat-return protocol; returns whether the adapter
    /// supports it.
    fn stat_ret(&mut self) -> bool {
        false
    }

    async fn close(&mut self) -> Result<()>;
}
