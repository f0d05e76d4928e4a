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

//! Directory listing over WebDAV PROPFIND.

use std::sync::Arc;

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::http::commands::HttpPropfind;
use crate::http::fs::HttpFs;
use crate::oss::api::{DirEntry, FileInfo, ObjectDir, OpenEnv};
use crate::oss::error::{Error, Result};
use crate::oss::utils::{final_component, from_http_header_value, trim_slashes};

#[derive(Clone, Debug, Default)]
struct DavEntry {
    href: String,
    is_dir: bool,
    size: i64,
    mtime: i64,
}

/// Parses a 207 Multi-Status body into its response entries.
///
/// Namespace prefixes vary by server, so elements are matched on their
/// local names.
fn parse_multistatus(xml: &[u8]) -> Result<Vec<DavEntry>> {
    let mut reader = Reader::from_reader(xml);

    let mut entries = Vec::new();
    let mut current: Option<DavEntry> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"response" => current = Some(DavEntry::default()),
                b"href" => {
                    let text = reader
                        .read_text(e.name())
                        .map_err(|e| Error::Internal(format!("malformed <href>: {e}")))?;
                    if let Some(entry) = current.as_mut() {
                        entry.href = percent_decode_str(text.trim())
                            .decode_utf8_lossy()
                            .into_owned();
                    }
                }
                b"getcontentlength" => {
                    let text = reader.read_text(e.name()).map_err(|e| {
                        Error::Internal(format!("malformed <getcontentlength>: {e}"))
                    })?;
                    if let Some(entry) = current.as_mut() {
                        entry.size = text.trim().parse().unwrap_or(0);
                    }
                }
                b"getlastmodified" => {
                    let text = reader.read_text(e.name()).map_err(|e| {
                        Error::Internal(format!("malformed <getlastmodified>: {e}"))
                    })?;
                    if let Some(entry) = current.as_mut() {
                        entry.mtime = from_http_header_value(text.trim())
                            .map(|t| t.timestamp())
                            .unwrap_or(0);
                    }
                }
                b"collection" => {
                    if let Some(entry) = current.as_mut() {
                        entry.is_dir = true;
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"collection" {
                    if let Some(entry) = current.as_mut() {
                        entry.is_dir = true;
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"response" {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(Error::Internal(format!("malformed multistatus: {e}"))),
        }
    }
    Ok(entries)
}

/// PROPFIND-backed directory object.
pub struct HttpDirectory {
    fs: Arc<HttpFs>,
    entries: Vec<DavEntry>,
    idx: usize,
    opened: bool,
    stat_ret: bool,
}

impl HttpDirectory {
    pub fn new(fs: Arc<HttpFs>) -> Self {
        HttpDirectory {
            fs,
            entries: Vec::new(),
            idx: 0,
            opened: false,
            stat_ret: false,
        }
    }
}

#[async_trait]
impl ObjectDir for HttpDirectory {
    async fn opendir(&mut self, path: &str, _env: &OpenEnv) -> Result<()> {
        if self.opened {
            return Err(Error::from_errno(libc::EBADF));
        }
        let object = self.fs.object_for(path)?;
        let propfind =
            HttpPropfind::new(self.fs.cfg.effective_url(), &object, self.fs.token.clone());
        let response = propfind.send(&self.fs.engine).await?;

        let mut entries = parse_multistatus(&response.body)?;
        // One entry describes the queried collection itself; drop every
        // entry whose href collapses to the query path.
        let self_path = trim_slashes(&object).to_string();
        let self_suffix = format!("/{self_path}");
        entries.retain(|e| {
            let rel = trim_slashes(&e.href);
            if rel.is_empty() {
                return false;
            }
            rel != self_path && (self_path.is_empty() || !rel.ends_with(&self_suffix))
        });
        self.entries = entries;
        self.idx = 0;
        self.opened = true;
        Ok(())
    }

    async fn readdir(&mut self, max_name: usize) -> Result<Option<DirEntry>> {
        if !self.opened {
            return Err(Error::from_errno(libc::EBADF));
        }
        let Some(entry) = self.entries.get(self.idx) else {
            return Ok(None);
        };
        let name = final_component(&entry.href).to_string();
        if name.len() > max_name {
            return Err(Error::from_errno(libc::ENOMEM));
        }
        self.idx += 1;
        if self.stat_ret {
            let info = if entry.is_dir {
                FileInfo::directory()
            } else {
                FileInfo::regular(entry.size, entry.mtime)
            };
            Ok(Some(DirEntry::with_info(name, info)))
        } else {
            Ok(Some(DirEntry::new(name)))
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
        self.opened = false;
        self.entries.clear();
        self.idx = 0;
        Ok(())
    }
}
