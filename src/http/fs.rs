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

//! HTTP/WebDAV storage adapter: configuration and filesystem surface.

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::Engine;
use crate::http::dir::HttpDirectory;
use crate::http::file::HttpFile;
use crate::http::token::TokenFile;
use crate::oss::api::{FileInfo, ObjectDir, ObjectFile, ObjectFs, OpenEnv};
use crate::oss::config::ConfigDoc;
use crate::oss::error::{Error, Result};
use crate::oss::logging::LogMask;

/// Configuration of one HTTP endpoint.
#[derive(Clone, Debug, Default)]
pub struct HttpFsConfig {
    pub host_name: String,
    pub host_url: String,
    /// Overrides `host_url` when set.
    pub url_base: String,
    /// Prefix stripped from logical paths when `url_base` is in use.
    pub storage_prefix: String,
    pub token_file: Option<String>,
    pub mask: LogMask,
}

impl HttpFsConfig {
    pub fn from_config(doc: &ConfigDoc) -> Result<Self> {
        let mut cfg = HttpFsConfig {
            mask: LogMask::default_mask(),
            ..Default::default()
        };
        for directive in doc.section("httpserver") {
            match directive.key.as_str() {
                "httpserver.host_name" => cfg.host_name = directive.require_arg()?.to_string(),
                "httpserver.host_url" => cfg.host_url = directive.require_arg()?.to_string(),
                "httpserver.url_base" => cfg.url_base = directive.require_arg()?.to_string(),
                "httpserver.storage_prefix" => {
                    cfg.storage_prefix = directive.require_arg()?.to_string()
                }
                "httpserver.token_file" => {
                    cfg.token_file = Some(directive.require_arg()?.to_string())
                }
                "httpserver.trace" => {
                    cfg.mask = LogMask::parse_levels(directive.args.iter().map(String::as_str))?
                }
                other => {
                    return Err(Error::Config(format!(
                        "unknown configuration directive {other}"
                    )));
                }
            }
        }
        if cfg.url_base.is_empty() {
            if cfg.host_name.is_empty() {
                return Err(Error::Config(
                    "httpserver.host_name not specified; this or httpserver.url_base are required"
                        .into(),
                ));
            }
            if cfg.host_url.is_empty() {
                return Err(Error::Config(
                    "httpserver.host_url not specified; this or httpserver.url_base are required"
                        .into(),
                ));
            }
        }
        Ok(cfg)
    }

    /// Base URL requests are issued against.
    pub fn effective_url(&self) -> &str {
        if self.url_base.is_empty() {
            &self.host_url
        } else {
            &self.url_base
        }
    }

    /// Logical-path prefix stripped before building the object name.
    pub fn effective_prefix(&self) -> &str {
        if self.url_base.is_empty() {
            &self.host_name
        } else {
            &self.storage_prefix
        }
    }
}

/// Splits a logical path into the object name below the configured
/// prefix.  The prefix components must match exactly; an equal path
/// yields the empty object (the endpoint root).
pub(crate) fn parse_path(prefix: &str, path: &str) -> Result<String> {
    let prefix_parts: Vec<&str> = prefix.split('/').filter(|c| !c.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();

    if path_parts.len() < prefix_parts.len() {
        return Err(Error::from_errno(libc::ENOENT));
    }
    if path_parts[..prefix_parts.len()] != prefix_parts[..] {
        return Err(Error::from_errno(libc::ENOENT));
    }
    Ok(path_parts[prefix_parts.len()..].join("/"))
}

/// The HTTP/WebDAV filesystem adapter.
pub struct HttpFs {
    pub(crate) engine: Arc<Engine>,
    pub(crate) cfg: HttpFsConfig,
    pub(crate) token: Option<Arc<TokenFile>>,
}

impl HttpFs {
    pub fn new(engine: Arc<Engine>, cfg: HttpFsConfig) -> Arc<Self> {
        let token = cfg.token_file.as_ref().map(|p| Arc::new(TokenFile::new(p)));
        Arc::new(HttpFs { engine, cfg, token })
    }

    pub fn from_config(engine: Arc<Engine>, doc: &ConfigDoc) -> Result<Arc<Self>> {
        Ok(Self::new(engine, HttpFsConfig::from_config(doc)?))
    }

    pub(crate) fn object_for(&self, path: &str) -> Result<String> {
        parse_path(self.cfg.effective_prefix(), path)
    }

    pub(crate) fn debug_enabled(&self) -> bool {
        self.cfg.mask.debug_enabled()
    }
}

#[async_trait]
impl ObjectFs for Arc<HttpFs> {
    fn new_file(&self) -> Box<dyn ObjectFile> {
        Box::new(HttpFile::new(Arc::clone(self)))
    }

    fn new_dir(&self) -> Box<dyn ObjectDir> {
        Box::new(HttpDirectory::new(Arc::clone(self)))
    }

    async fn stat(&self, path: &str, _opts: i32, env: &OpenEnv) -> Result<FileInfo> {
        if self.debug_enabled() {
            log::debug!("stat'ing path {path}");
        }
        let mut file = HttpFile::new(Arc::clone(self));
        file.open_for_stat(path, env).await?;
        file.fstat().await
    }

    async fn create(
        &self,
        _tid: &str,
        path: &str,
        _mode: u32,
        _env: &OpenEnv,
        _opts: i32,
    ) -> Result<()> {
        // The object materializes on upload; creating early would expose
        // an empty file.  Just validate the path.
        self.object_for(path).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_path_strips_prefix() {
        assert_eq!(parse_path("example.org", "/example.org/a/b.txt").unwrap(), "a/b.txt");
        assert_eq!(parse_path("/store/data", "/store/data/x").unwrap(), "x");
        assert_eq!(parse_path("example.org", "/example.org").unwrap(), "");
    }

    #[test]
    fn parse_path_rejects_foreign_prefix() {
        let err = parse_path("example.org", "/other.org/a").unwrap_err();
        assert_eq!(err.neg_errno(), -libc::ENOENT);
        assert!(parse_path("a/b/c", "/a/b").is_err());
    }

    #[test]
    fn config_requires_host_or_base() {
        let doc = ConfigDoc::parse("httpserver.host_name example.org\n");
        assert!(HttpFsConfig::from_config(&doc).is_err());

        let doc = ConfigDoc::parse(
            "httpserver.host_name example.org\nhttpserver.host_url https://example.org\n",
        );
        let cfg = HttpFsConfig::from_config(&doc).unwrap();
        assert_eq!(cfg.effective_url(), "https://example.org");
        assert_eq!(cfg.effective_prefix(), "example.org");
    }

    #[test]
    fn url_base_overrides_host() {
        let doc = ConfigDoc::parse(
            "httpserver.host_name example.org\n\
             httpserver.host_url https://example.org\n\
             httpserver.url_base https://cdn.example.org/base\n\
             httpserver.storage_prefix /store\n",
        );
        let cfg = HttpFsConfig::from_config(&doc).unwrap();
        assert_eq!(cfg.effective_url(), "https://cdn.example.org/base");
        assert_eq!(cfg.effective_prefix(), "/store");
    }

    #[test]
    fn trace_directive_sets_mask() {
        let doc = ConfigDoc::parse(
            "httpserver.url_base https://example.org\nhttpserver.trace debug\n",
        );
        let cfg = HttpFsConfig::from_config(&doc).unwrap();
        assert!(cfg.mask.debug_enabled());
    }
}
