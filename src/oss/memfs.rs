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

//! In-memory `ObjectFs` used by the wrapper test suites.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::oss::api::{DirEntry, FileInfo, ObjectDir, ObjectFile, ObjectFs, OpenEnv};
use crate::oss::error::{Error, Result};

#[derive(Clone, Debug)]
enum Node {
    Dir { mode: u32 },
    File { data: Vec<u8>, mode: u32, mtime: i64 },
}

#[derive(Default)]
struct State {
    nodes: HashMap<String, Node>,
}

fn now_epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn parent_of(path: &str) -> Option<String> {
    let norm = normalize(path);
    let idx = norm.rfind('/')?;
    if idx == 0 {
        (norm.len() > 1).then(|| "/".to_string())
    } else {
        Some(norm[..idx].to_string())
    }
}

/// Shared in-memory filesystem.  Clones share state.
#[derive(Clone)]
pub struct MemFs {
    state: Arc<Mutex<State>>,
}

impl MemFs {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::Dir { mode: 0o755 });
        MemFs {
            state: Arc::new(Mutex::new(State { nodes })),
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().unwrap().nodes.contains_key(&normalize(path))
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.state.lock().unwrap().nodes.get(&normalize(path)) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn mode_of(&self, path: &str) -> Option<u32> {
        match self.state.lock().unwrap().nodes.get(&normalize(path)) {
            Some(Node::File { mode, .. }) => Some(*mode),
            Some(Node::Dir { mode }) => Some(*mode),
            None => None,
        }
    }

    pub fn set_mtime(&self, path: &str, mtime: i64) {
        if let Some(Node::File { mtime: m, .. }) =
            self.state.lock().unwrap().nodes.get_mut(&normalize(path))
        {
            *m = mtime;
        }
    }

    pub fn mtime_of(&self, path: &str) -> Option<i64> {
        match self.state.lock().unwrap().nodes.get(&normalize(path)) {
            Some(Node::File { mtime, .. }) => Some(*mtime),
            _ => None,
        }
    }

    pub fn insert_file(&self, path: &str, data: &[u8]) {
        let norm = normalize(path);
        let mut state = self.state.lock().unwrap();
        // Materialize parents so listings stay coherent.
        let mut cur = parent_of(&norm);
        while let Some(p) = cur {
            state
                .nodes
                .entry(p.clone())
                .or_insert(Node::Dir { mode: 0o755 });
            cur = parent_of(&p);
        }
        state.nodes.insert(
            norm,
            Node::File {
                data: data.to_vec(),
                mode: 0o644,
                mtime: now_epoch(),
            },
        );
    }

    pub fn paths(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut paths: Vec<_> = state.nodes.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn stat_node(&self, path: &str) -> Result<FileInfo> {
        let state = self.state.lock().unwrap();
        match state.nodes.get(&normalize(path)) {
            Some(Node::Dir { mode }) => {
                let mut info = FileInfo::directory();
                info.mode = *mode | libc::S_IFDIR as u32;
                Ok(info)
            }
            Some(Node::File { data, mode, mtime }) => {
                let mut info = FileInfo::regular(data.len() as i64, *mtime);
                info.mode = *mode | libc::S_IFREG as u32;
                Ok(info)
            }
            None => Err(Error::from_errno(libc::ENOENT)),
        }
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectFs for MemFs {
    fn new_file(&self) -> Box<dyn ObjectFile> {
        Box::new(MemFile {
            fs: self.clone(),
            path: None,
            writable: false,
        })
    }

    fn new_dir(&self) -> Box<dyn ObjectDir> {
        Box::new(MemDir {
            fs: self.clone(),
            entries: Vec::new(),
            idx: 0,
            opened: false,
            stat_ret: false,
        })
    }

    async fn stat(&self, path: &str, _opts: i32, _env: &OpenEnv) -> Result<FileInfo> {
        self.stat_node(path)
    }

    async fn mkdir(&self, path: &str, mode: u32, mkpath: bool, _env: &OpenEnv) -> Result<()> {
        let norm = normalize(path);
        let mut state = self.state.lock().unwrap();
        if state.nodes.contains_key(&norm) {
            return Err(Error::from_errno(libc::EEXIST));
        }
        if let Some(parent) = parent_of(&norm) {
            if !state.nodes.contains_key(&parent) {
                if !mkpath {
                    return Err(Error::from_errno(libc::ENOENT));
                }
                let mut missing = vec![parent.clone()];
                let mut cur = parent_of(&parent);
                while let Some(p) = cur {
                    if state.nodes.contains_key(&p) {
                        break;
                    }
                    missing.push(p.clone());
                    cur = parent_of(&p);
                }
                for p in missing.into_iter().rev() {
                    state.nodes.insert(p, Node::Dir { mode });
                }
            }
        }
        state.nodes.insert(norm, Node::Dir { mode });
        Ok(())
    }

    async fn remdir(&self, path: &str, _opts: i32, _env: &OpenEnv) -> Result<()> {
        let norm = normalize(path);
        let mut state = self.state.lock().unwrap();
        match state.nodes.get(&norm) {
            Some(Node::Dir { .. }) => {
                state.nodes.remove(&norm);
                Ok(())
            }
            Some(_) => Err(Error::from_errno(libc::ENOTDIR)),
            None => Err(Error::from_errno(libc::ENOENT)),
        }
    }

    async fn rename(&self, from: &str, to: &str, _env: &OpenEnv) -> Result<()> {
        let from = normalize(from);
        let to = normalize(to);
        let mut state = self.state.lock().unwrap();
        let node = state
            .nodes
            .remove(&from)
            .ok_or_else(|| Error::from_errno(libc::ENOENT))?;
        state.nodes.insert(to, node);
        Ok(())
    }

    async fn unlink(&self, path: &str, _opts: i32, _env: &OpenEnv) -> Result<()> {
        let norm = normalize(path);
        let mut state = self.state.lock().unwrap();
        match state.nodes.get(&norm) {
            Some(Node::File { .. }) => {
                state.nodes.remove(&norm);
                Ok(())
            }
            Some(_) => Err(Error::from_errno(libc::EISDIR)),
            None => Err(Error::from_errno(libc::ENOENT)),
        }
    }

    async fn truncate(&self, path: &str, size: u64, _env: &OpenEnv) -> Result<()> {
        let norm = normalize(path);
        let mut state = self.state.lock().unwrap();
        match state.nodes.get_mut(&norm) {
            Some(Node::File { data, mtime, .. }) => {
                data.resize(size as usize, 0);
                *mtime = now_epoch();
                Ok(())
            }
            _ => Err(Error::from_errno(libc::ENOENT)),
        }
    }

    async fn chmod(&self, path: &str, mode: u32, _env: &OpenEnv) -> Result<()> {
        let norm = normalize(path);
        let mut state = self.state.lock().unwrap();
        match state.nodes.get_mut(&norm) {
            Some(Node::File { mode: m, .. }) | Some(Node::Dir { mode: m }) => {
                *m = mode;
                Ok(())
            }
            None => Err(Error::from_errno(libc::ENOENT)),
        }
    }
}

pub struct MemFile {
    fs: MemFs,
    path: Option<String>,
    writable: bool,
}

#[async_trait]
impl ObjectFile for MemFile {
    async fn open(&mut self, path: &str, oflag: i32, mode: u32, _env: &OpenEnv) -> Result<()> {
        if self.path.is_some() {
            return Err(Error::from_errno(libc::EBADF));
        }
        let norm = normalize(path);
        let mut state = self.fs.state.lock().unwrap();
        let exists = state.nodes.contains_key(&norm);
        if oflag & libc::O_CREAT != 0 {
            if exists && oflag & libc::O_EXCL != 0 {
                return Err(Error::from_errno(libc::EEXIST));
            }
            if let Some(parent) = parent_of(&norm) {
                if !state.nodes.contains_key(&parent) {
                    return Err(Error::from_errno(libc::ENOENT));
                }
            }
            if !exists || oflag & libc::O_TRUNC != 0 {
                state.nodes.insert(
                    norm.clone(),
                    Node::File {
                        data: Vec::new(),
                        mode,
                        mtime: now_epoch(),
                    },
                );
            }
        } else if !exists {
            return Err(Error::from_errno(libc::ENOENT));
        }
        self.writable = oflag & (libc::O_WRONLY | libc::O_RDWR | libc::O_CREAT) != 0;
        self.path = Some(norm);
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let path = self.path.as_ref().ok_or(Error::from_errno(libc::EBADF))?;
        let state = self.fs.state.lock().unwrap();
        match state.nodes.get(path) {
            Some(Node::File { data, .. }) => {
                let start = (offset as usize).min(data.len());
                let n = (data.len() - start).min(buf.len());
                buf[..n].copy_from_slice(&data[start..start + n]);
                Ok(n)
            }
            _ => Err(Error::from_errno(libc::EBADF)),
        }
    }

    async fn write(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        let path = self.path.as_ref().ok_or(Error::from_errno(libc::EBADF))?;
        if !self.writable {
            return Err(Error::from_errno(libc::EBADF));
        }
        let mut state = self.fs.state.lock().unwrap();
        match state.nodes.get_mut(path) {
            Some(Node::File { data, mtime, .. }) => {
                let end = offset as usize + buf.len();
                if data.len() < end {
                    data.resize(end, 0);
                }
                data[offset as usize..end].copy_from_slice(buf);
                *mtime = now_epoch();
                Ok(buf.len())
            }
            _ => Err(Error::from_errno(libc::EBADF)),
        }
    }

    async fn fstat(&mut self) -> Result<FileInfo> {
        let path = self.path.as_ref().ok_or(Error::from_errno(libc::EBADF))?;
        self.fs.stat_node(path)
    }

    async fn utimes(&mut self, mtime: i64) -> Result<()> {
        let path = self.path.as_ref().ok_or(Error::from_errno(libc::EBADF))?;
        self.fs.set_mtime(path, mtime);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.path = None;
        Ok(())
    }
}

pub struct MemDir {
    fs: MemFs,
    entries: Vec<(String, FileInfo)>,
    idx: usize,
    opened: bool,
    stat_ret: bool,
}

#[async_trait]
impl ObjectDir for MemDir {
    async fn opendir(&mut self, path: &str, _env: &OpenEnv) -> Result<()> {
        if self.opened {
            return Err(Error::from_errno(libc::EBADF));
        }
        let norm = normalize(path);
        let state = self.fs.state.lock().unwrap();
        if !matches!(state.nodes.get(&norm), Some(Node::Dir { .. })) {
            return Err(Error::from_errno(libc::ENOENT));
        }
        let prefix = if norm == "/" { String::new() } else { norm.clone() };
        let mut entries = Vec::new();
        for (p, node) in state.nodes.iter() {
            let Some(rest) = p.strip_prefix(&prefix) else {
                continue;
            };
            let Some(name) = rest.strip_prefix('/') else {
                continue;
            };
            if name.is_empty() || name.contains('/') {
                continue;
            }
            let info = match node {
                Node::Dir { .. } => FileInfo::directory(),
                Node::File { data, mtime, .. } => FileInfo::regular(data.len() as i64, *mtime),
            };
            entries.push((name.to_string(), info));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        self.entries = entries;
        self.idx = 0;
        self.opened = true;
        Ok(())
    }

    async fn readdir(&mut self, max_name: usize) -> Result<Option<DirEntry>> {
        if !self.opened {
            return Err(Error::from_errno(libc::EBADF));
        }
        let Some((name, info)) = self.entries.get(self.idx) else {
            return Ok(None);
        };
        if name.len() > max_name {
            return Err(Error::from_errno(libc::ENOMEM));
        }
        self.idx += 1;
        Ok(Some(if self.stat_ret {
            DirEntry::with_info(name.clone(), *info)
        } else {
            DirEntry::new(name.clone())
        }))
    }

    fn stat_ret(&mut self) -> bool {
        self.stat_ret = true;
        true
    }

    async fn close(&mut self) -> Result<()> {
        self.opened = false;
        self.entries.clear();
        Ok(())
    }
}
