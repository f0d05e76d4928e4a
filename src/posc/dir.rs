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

//! Directory wrapper that keeps scratch entries out of listings.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use crate::oss::api::{DirEntry, ObjectDir, OpenEnv};
use crate::oss::error::{Error, Result};
use crate::posc::PoscFs;

pub struct PoscDir {
    fs: Arc<PoscFs>,
    inner: Box<dyn ObjectDir>,
    prefix: String,
}

impl PoscDir {
    pub fn new(fs: Arc<PoscFs>, inner: Box<dyn ObjectDir>) -> Self {
        PoscDir {
            fs,
            inner,
            prefix: String::new(),
        }
    }
}

#[async_trait]
impl ObjectDir for PoscDir {
    async fn opendir(&mut self, path: &str, env: &OpenEnv) -> Result<()> {
        if self.fs.in_posc_dir(path) {
            if self.fs.debug_enabled() {
                debug!("ignoring directory {path} as it is the POSC temporary directory");
            }
            return Err(Error::from_errno(libc::ENOENT));
        }
        self.prefix = path.trim_end_matches('/').to_string();
        self.inner.opendir(path, env).await
    }

    async fn readdir(&mut self, max_name: usize) -> Result<Option<DirEntry>> {
        loop {
            let Some(entry) = self.inner.readdir(max_name).await? else {
                return Ok(None);
            };
            // `.` and `..` always pass so web-rendered listings can
            // navigate; path normalization upstream keeps them from
            // reaching the POSC check as real components.
            if entry.name == "." || entry.name == ".." {
                return Ok(Some(entry));
            }
            let full = format!("{}/{}", self.prefix, entry.name);
            if self.fs.in_posc_dir(&full) {
                if self.fs.debug_enabled() {
                    debug!("ignoring directory entry {full} as it is in the POSC directory");
                }
                continue;
            }
            return Ok(Some(entry));
        }
    }

    fn stat_ret(&mut self) -> bool {
        self.inner.stat_ret()
    }

    async fn close(&mut self) -> Result<()> {
        self.prefix.clear();
        self.inner.close().await
    }
}
