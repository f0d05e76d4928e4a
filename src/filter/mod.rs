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

//! Glob-based access filter over the namespace.
//!
//! An operation is accepted only if its path matches at least one
//! configured rule.  A partial match (the path is a prefix of a rule)
//! is enough for stat-like traversal but not for opening a file.

pub mod glob;

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};

use crate::filter::glob::{GlobMatch, GlobRule};
use crate::oss::api::{DirEntry, FileInfo, ObjectDir, ObjectFile, ObjectFs, OpenEnv};
use crate::oss::config::ConfigDoc;
use crate::oss::error::{Error, Result};
use crate::oss::logging::LogMask;

#[derive(Clone, Debug, Default)]
pub struct FilterConfig {
    pub rules: Vec<GlobRule>,
    pub mask: LogMask,
}

impl FilterConfig {
    /// Understands `filter.trace`, `filter.glob [-a] <glob>…` and
    /// `filter.prefix <path>…`; a prefix is sugar for a dotfile-matching
    /// `<path>/**` glob.
    pub fn from_config(doc: &ConfigDoc) -> Result<Self> {
        let mut cfg = FilterConfig {
            rules: Vec::new(),
            mask: LogMask::default_mask(),
        };
        for directive in doc.section("filter") {
            match directive.key.as_str() {
                "filter.trace" => {
                    cfg.mask = LogMask::parse_levels(directive.args.iter().map(String::as_str))?
                }
                "filter.glob" => {
                    let mut args = directive.args.iter().map(String::as_str).peekable();
                    let mut match_dotfile = false;
                    if args.peek() == Some(&"-a") {
                        match_dotfile = true;
                        args.next();
                    }
                    let mut seen = false;
                    for glob in args {
                        seen = true;
                        let rule = GlobRule::parse(glob, match_dotfile).ok_or_else(|| {
                            Error::Config(format!(
                                "filter.glob requires an absolute path, got '{glob}'"
                            ))
                        })?;
                        cfg.rules.push(rule);
                    }
                    if !seen {
                        return Err(Error::Config(
                            "filter.glob requires an argument; usage: \
                             filter.glob [-a] [glob1] [glob2] ..."
                                .into(),
                        ));
                    }
                }
                "filter.prefix" => {
                    if directive.args.is_empty() {
                        return Err(Error::Config(
                            "filter.prefix requires an argument; usage: \
                             filter.prefix [prefix1] [prefix2] ..."
                                .into(),
                        ));
                    }
                    for prefix in &directive.args {
                        let sanitized = sanitize_prefix(prefix)?;
                        let rule = GlobRule::parse(&format!("{sanitized}/**"), true)
                            .expect("sanitized prefix is absolute");
                        cfg.rules.push(rule);
                    }
                }
                other => {
                    return Err(Error::Config(format!(
                        "unknown configuration directive {other}"
                    )));
                }
            }
        }
        if cfg.rules.is_empty() {
            info!("no globs specified; will allow all paths");
        }
        if cfg.mask.contains(LogMask::INFO) {
            for rule in &cfg.rules {
                info!(
                    "will permit glob {}{}",
                    rule.display(),
                    if rule.match_dotfile { " (all)" } else { "" }
                );
            }
        }
        Ok(cfg)
    }
}

/// A prefix may not contain `.`/`..` components or glob metacharacters;
/// the result is slash-normalized.
fn sanitize_prefix(prefix: &str) -> Result<String> {
    if !prefix.starts_with('/') {
        return Err(Error::Config("filter.prefix must be absolute".into()));
    }
    let mut components = Vec::new();
    for component in prefix.split('/').filter(|c| !c.is_empty()) {
        if component == "." || component == ".." {
            return Err(Error::Config(format!(
                "prefix may not contain a path component of '.' or '..': {prefix}"
            )));
        }
        if component.contains(['[', '*', '?']) {
            return Err(Error::Config(format!(
                "prefix may not contain any of '*', '?' or '[': {prefix}"
            )));
        }
        components.push(component);
    }
    Ok(format!("/{}", components.join("/")))
}

/// The filter filesystem wrapper.
pub struct FilterFs {
    inner: Arc<dyn ObjectFs>,
    rules: Vec<GlobRule>,
    mask: LogMask,
}

impl FilterFs {
    pub fn new(inner: Arc<dyn ObjectFs>, cfg: FilterConfig) -> Arc<Self> {
        Arc::new(FilterFs {
            inner,
            rules: cfg.rules,
            mask: cfg.mask,
        })
    }

    fn debug_enabled(&self) -> bool {
        self.mask.debug_enabled()
    }

    pub fn from_config(inner: Arc<dyn ObjectFs>, doc: &ConfigDoc) -> Result<Arc<Self>> {
        Ok(Self::new(inner, FilterConfig::from_config(doc)?))
    }

    /// First matching rule wins; an empty rule set allows everything.
    pub(crate) fn glob(&self, path: &str) -> GlobMatch {
        if self.rules.is_empty() {
            return GlobMatch::Full;
        }
        for rule in &self.rules {
            match rule.matches(path) {
                GlobMatch::None => continue,
                matched => return matched,
            }
        }
        GlobMatch::None
    }

    fn verify_path(&self, path: &str, partial_ok: bool) -> Result<()> {
        match self.glob(path) {
            GlobMatch::None => {
                if self.debug_enabled() {
                    debug!("path {path} matches no glob");
                }
                Err(Error::from_errno(libc::ENOENT))
            }
            GlobMatch::Partial if !partial_ok => {
                if self.debug_enabled() {
                    debug!("path {path} is a prefix of a glob");
                }
                Err(Error::from_errno(libc::EISDIR))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectFs for Arc<FilterFs> {
    fn new_file(&self) -> Box<dyn ObjectFile> {
        Box::new(FilterFile {
            fs: Arc::clone(self),
            inner: self.inner.new_file(),
        })
    }

    fn new_dir(&self) -> Box<dyn ObjectDir> {
        Box::new(FilterDir {
            fs: Arc::clone(self),
            inner: self.inner.new_dir(),
            prefix: String::new(),
            stat_ret: false,
        })
    }

    async fn stat(&self, path: &str, opts: i32, env: &OpenEnv) -> Result<FileInfo> {
        self.verify_path(path, true)?;
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
        self.verify_path(path, false)?;
        self.inner.create(tid, path, mode, env, opts).await
    }

    async fn mkdir(&self, path: &str, mode: u32, mkpath: bool, env: &OpenEnv) -> Result<()> {
        self.verify_path(path, true)?;
        self.inner.mkdir(path, mode, mkpath, env).await
    }

    async fn remdir(&self, path: &str, opts: i32, env: &OpenEnv) -> Result<()> {
        self.verify_path(path, true)?;
        self.inner.remdir(path, opts, env).await
    }

    async fn rename(&self, from: &str, to: &str, env: &OpenEnv) -> Result<()> {
        if self.glob(from) == GlobMatch::None {
            if self.debug_enabled() {
                debug!("failing rename as source path matches no glob: {from}");
            }
            return Err(Error::from_errno(libc::ENOENT));
        }
        if self.glob(to) == GlobMatch::None {
            if self.debug_enabled() {
                debug!("failing rename as destination path matches no glob: {to}");
            }
            return Err(Error::from_errno(libc::ENOENT));
        }
        self.inner.rename(from, to, env).await
    }

    async fn unlink(&self, path: &str, opts: i32, env: &OpenEnv) -> Result<()> {
        self.verify_path(path, false)?;
        self.inner.unlink(path, opts, env).await
    }

    async fn truncate(&self, path: &str, size: u64, env: &OpenEnv) -> Result<()> {
        self.verify_path(path, false)?;
        self.inner.truncate(path, size, env).await
    }

    async fn chmod(&self, path: &str, mode: u32, env: &OpenEnv) -> Result<()> {
        self.verify_path(path, true)?;
        self.inner.chmod(path, mode, env).await
    }

    fn lfn2pfn(&self, path: &str) -> Result<String> {
        self.verify_path(path, true)?;
        self.inner.lfn2pfn(path)
    }
}

pub struct FilterFile {
    fs: Arc<FilterFs>,
    inner: Box<dyn ObjectFile>,
}

#[async_trait]
impl ObjectFile for FilterFile {
    async fn open(&mut self, path: &str, oflag: i32, mode: u32, env: &OpenEnv) -> Result<()> {
        match self.fs.glob(path) {
            GlobMatch::None => {
                if self.fs.debug_enabled() {
                    debug!("failing file open as path matches no glob: {path}");
                }
                Err(Error::from_errno(libc::ENOENT))
            }
            GlobMatch::Partial => {
                if self.fs.debug_enabled() {
                    debug!("failing file open as path is a prefix of a glob: {path}");
                }
                Err(Error::from_errno(libc::EISDIR))
            }
            GlobMatch::Full => self.inner.open(path, oflag, mode, env).await,
        }
    }

    async fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.inner.read(buf, offset).await
    }

    async fn write(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        self.inner.write(buf, offset).await
    }

    async fn fstat(&mut self) -> Result<FileInfo> {
        self.inner.fstat().await
    }

    async fn utimes(&mut self, mtime: i64) -> Result<()> {
        self.inner.utimes(mtime).await
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.close().await
    }
}

pub struct FilterDir {
    fs: Arc<FilterFs>,
    inner: Box<dyn ObjectDir>,
    prefix: String,
    stat_ret: bool,
}

impl FilterDir {
    /// Directory-ness of a partially matched entry, from the carried
    /// stat when available, otherwise by asking the wrapped filesystem.
    async fn entry_is_dir(fs: &Arc<FilterFs>, entry: &DirEntry, full_path: &str) -> Result<bool> {
        if let Some(info) = entry.info {
            return Ok(info.is_dir());
        }
        let env = OpenEnv::new();
        Ok(fs.inner.stat(full_path, 0, &env).await?.is_dir())
    }
}

#[async_trait]
impl ObjectDir for FilterDir {
    async fn opendir(&mut self, path: &str, env: &OpenEnv) -> Result<()> {
        if self.fs.glob(path) == GlobMatch::None {
            if self.fs.debug_enabled() {
                debug!("ignoring directory as it passes no glob: {path}");
            }
            return Err(Error::from_errno(libc::ENOENT));
        }
        self.prefix = path.trim_end_matches('/').to_string();
        // Ask the wrapped directory for per-entry stats so partial
        // matches can be classified without extra requests.
        self.inner.stat_ret();
        self.inner.opendir(path, env).await
    }

    async fn readdir(&mut self, max_name: usize) -> Result<Option<DirEntry>> {
        loop {
            let Some(entry) = self.inner.readdir(max_name).await? else {
                return Ok(None);
            };
            // Dot entries always pass; they only support navigation and
            // are normalized out before reaching this layer again.
            if entry.name == "." || entry.name == ".." {
                return Ok(Some(self.strip(entry)));
            }
            let full = format!("{}/{}", self.prefix, entry.name);
            match self.fs.glob(&full) {
                GlobMatch::Full => return Ok(Some(self.strip(entry))),
                GlobMatch::Partial => {
                    // Partially matched directories stay visible so the
                    // hierarchy can be traversed; files do not.
                    if Self::entry_is_dir(&self.fs, &entry, &full).await? {
                        return Ok(Some(self.strip(entry)));
                    }
                    if self.fs.debug_enabled() {
                        debug!("ignoring file {full} as it is only a prefix for a glob");
                    }
                }
                GlobMatch::None => {
                    if self.fs.debug_enabled() {
                        debug!("ignoring entry {full} as it passes no glob");
                    }
                }
            }
        }
    }

    fn stat_ret(&mut self) -> bool {
        self.stat_ret = true;
        true
    }

    async fn close(&mut self) -> Result<()> {
        self.prefix.clear();
        self.inner.close().await
    }
}

impl FilterDir {
    /// Drops the carried stat when the caller did not opt in to the
    /// stat-return protocol.
    fn strip(&self, mut entry: DirEntry) -> DirEntry {
        if !self.stat_ret {
            entry.info = None;
        }
        entry
    }
}
