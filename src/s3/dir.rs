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

//! Directory view over a flat bucket.
//!
//! Each page of a `list-type=2` listing is walked files first, then the
//! literal `.` and `..` markers (once per open), then the common
//! prefixes.  When a page is exhausted and a continuation token is
//! present the next page is fetched transparently.

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;

use crate::oss::api::{DirEntry, FileInfo, ObjectDir, OpenEnv};
use crate::oss::error::{Error, Result};
use crate::oss::utils::{final_component, trim_slashes};
use crate::s3::access_info::S3AccessInfo;
use crate::s3::commands::{Listing, S3List};
use crate::s3::fs::S3Fs;

const LIST_PAGE_SIZE: usize = 1000;

pub struct S3Directory {
    fs: Arc<S3Fs>,
    ai: Option<S3AccessInfo>,
    object: String,
    listing: Listing,
    /// Cursor into the current page: files, then dots, then prefixes.
    file_idx: usize,
    dot_idx: usize,
    prefix_idx: usize,
    dots_done: bool,
    opened: bool,
    stat_ret: bool,
}

impl S3Directory {
    pub fn new(fs: Arc<S3Fs>) -> Self {
        S3Directory {
            fs,
            ai: None,
            object: String::new(),
            listing: Listing::default(),
            file_idx: 0,
            dot_idx: 0,
            prefix_idx: 0,
            dots_done: false,
            opened: false,
            stat_ret: false,
        }
    }

    fn reset(&mut self) {
        self.ai = None;
        self.object.clear();
        self.listing = Listing::default();
        self.file_idx = 0;
        self.dot_idx = 0;
        self.prefix_idx = 0;
        self.dots_done = false;
        self.opened = false;
        self.stat_ret = false;
    }

    fn list_prefix(&self) -> String {
        if self.object.is_empty() {
            String::new()
        } else {
            format!("{}/", self.object)
        }
    }

    async fn fetch_page(&mut self, continuation_token: &str) -> Result<()> {
        let ai = self.ai.clone().ok_or(Error::from_errno(libc::EBADF))?;
        let list = S3List::new(&ai, &self.list_prefix(), LIST_PAGE_SIZE)?;
        self.listing = list
            .send(&self.fs.engine, continuation_token)
            .await
            .map_err(|e| {
                warn!("failed to list objects under {}: {e}", self.object);
                e
            })?;
        self.file_idx = 0;
        self.prefix_idx = 0;
        Ok(())
    }

    fn entry(&self, name: String, info: FileInfo) -> DirEntry {
        if self.stat_ret {
            DirEntry::with_info(name, info)
        } else {
            DirEntry::new(name)
        }
    }
}

#[async_trait]
impl ObjectDir for S3Directory {
    async fn opendir(&mut self, path: &str, _env: &OpenEnv) -> Result<()> {
        if self.opened {
            return Err(Error::from_errno(libc::EBADF));
        }
        self.reset();

        let (exposed, mut object) = self.fs.parse_path(path)?;
        let ai = self.fs.access_info(&exposed, &mut object)?;
        self.ai = Some(ai);
        self.object = trim_slashes(&object).to_string();

        self.fetch_page("").await?;
        self.opened = true;
        Ok(())
    }

    async fn readdir(&mut self, max_name: usize) -> Result<Option<DirEntry>> {
        if !self.opened {
            return Err(Error::from_errno(libc::EBADF));
        }

        loop {
            if self.file_idx < self.listing.objects.len() {
                let object = &self.listing.objects[self.file_idx];
                let name = final_component(&object.key).to_string();
                if name.len() > max_name {
                    return Err(Error::from_errno(libc::ENOMEM));
                }
                let info = FileInfo::regular(object.size, 0);
                self.file_idx += 1;
                return Ok(Some(self.entry(name, info)));
            }

            // `.` and `..` are emitted once so web-facing directory
            // renderings can navigate; wrappers pass them through
            // unfiltered.
            if !self.dots_done {
                let name = if self.dot_idx == 0 { "." } else { ".." };
                self.dot_idx += 1;
                if self.dot_idx == 2 {
                    self.dots_done = true;
                }
                return Ok(Some(self.entry(name.to_string(), FileInfo::directory())));
            }

            if self.prefix_idx < self.listing.common_prefixes.len() {
                let prefix = &self.listing.common_prefixes[self.prefix_idx];
                let name = final_component(prefix).to_string();
                if name.len() > max_name {
                    return Err(Error::from_errno(libc::ENOMEM));
                }
                self.prefix_idx += 1;
                return Ok(Some(self.entry(name, FileInfo::directory())));
            }

            // Page exhausted: follow the continuation token, if any.
            if self.listing.continuation_token.is_empty() {
                return Ok(None);
            }
            let token = self.listing.continuation_token.clone();
            self.fetch_page(&token).await?;
        }
    }

    fn stat_ret(&mut self) -> bool {
        self.stat_ret = true;
        true
    }

    async fn close(&mut self) -> Result<()> {
        if !self.opened {
            return Err(Error::from_errno(libc::EBADF));
        }
        self.reset();
        Ok(())
    }
}
