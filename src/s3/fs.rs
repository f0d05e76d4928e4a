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

//! S3 storage adapter: endpoint map and filesystem surface.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};

use crate::engine::Engine;
use crate::oss::api::{FileInfo, ObjectDir, ObjectFile, ObjectFs, OpenEnv};
use crate::oss::config::ConfigDoc;
use crate::oss::error::{Error, Result};
use crate::oss::logging::LogMask;
use crate::oss::utils::trim_slashes;
use crate::s3::access_info::{S3AccessInfo, S3Config};
use crate::s3::commands::S3List;
use crate::s3::dir::S3Directory;
use crate::s3::file::{DEFAULT_PART_SIZE, S3File};

/// The S3 filesystem adapter: a set of exported prefixes, each backed by
/// one configured endpoint.
pub struct S3Fs {
    pub(crate) engine: Arc<Engine>,
    pub(crate) part_size: usize,
    mask: LogMask,
    endpoints: HashMap<String, S3AccessInfo>,
}

impl S3Fs {
    pub fn new(engine: Arc<Engine>, cfg: S3Config) -> Arc<Self> {
        Self::with_part_size(engine, cfg, DEFAULT_PART_SIZE)
    }

    pub fn with_part_size(engine: Arc<Engine>, cfg: S3Config, part_size: usize) -> Arc<Self> {
        let mut endpoints = HashMap::new();
        for info in cfg.endpoints {
            endpoints.insert(info.path_name.clone(), info);
        }
        Arc::new(S3Fs {
            engine,
            part_size,
            mask: cfg.mask,
            endpoints,
        })
    }

    pub(crate) fn debug_enabled(&self) -> bool {
        self.mask.debug_enabled()
    }

    pub fn from_config(engine: Arc<Engine>, doc: &ConfigDoc) -> Result<Arc<Self>> {
        Ok(Self::new(engine, S3Config::from_config(doc)?))
    }

    pub(crate) fn exposed_path_exists(&self, path: &str) -> bool {
        self.endpoints.contains_key(path)
    }

    /// Walks the path components until an exported prefix matches; the
    /// remainder is the object name (which may itself contain `/`).
    pub(crate) fn parse_path(&self, full_path: &str) -> Result<(String, String)> {
        let components: Vec<&str> = full_path.split('/').filter(|c| !c.is_empty()).collect();
        let mut exposed = String::new();
        let mut matched = 0usize;
        for (idx, component) in components.iter().enumerate() {
            exposed.push('/');
            exposed.push_str(component);
            if self.exposed_path_exists(&exposed) {
                matched = idx + 1;
                break;
            }
            if idx + 1 == components.len() {
                return Err(Error::from_errno(libc::ENOENT));
            }
        }
        if matched == 0 {
            return Err(Error::from_errno(libc::ENOENT));
        }
        let object = components[matched..].join("/");
        Ok((exposed, object))
    }

    /// Resolves the endpoint for an exported prefix.  With no configured
    /// bucket, the object's first component names the bucket and is
    /// split off.
    pub(crate) fn access_info(&self, exposed: &str, object: &mut String) -> Result<S3AccessInfo> {
        let info = self
            .endpoints
            .get(exposed)
            .ok_or_else(|| Error::from_errno(libc::ENOENT))?;
        if !info.bucket_name.is_empty() {
            return Ok(info.clone());
        }
        let mut copy = info.clone();
        match object.find('/') {
            Some(idx) => {
                copy.bucket_name = object[..idx].to_string();
                *object = object[idx + 1..].to_string();
            }
            None => {
                copy.bucket_name = std::mem::take(object);
            }
        }
        Ok(copy)
    }
}

#[async_trait]
impl ObjectFs for Arc<S3Fs> {
    fn new_file(&self) -> Box<dyn ObjectFile> {
        Box::new(S3File::new(Arc::clone(self)))
    }

    fn new_dir(&self) -> Box<dyn ObjectDir> {
        Box::new(S3Directory::new(Arc::clone(self)))
    }

    /// Stat by listing with `max-keys=1`: an exact key match is a
    /// regular file, a `<object>/` common prefix is a directory.
    async fn stat(&self, path: &str, _opts: i32, _env: &OpenEnv) -> Result<FileInfo> {
        if self.debug_enabled() {
            debug!("stat'ing path {path}");
        }

        let (exposed, mut object) = self.parse_path(path)?;
        let ai = match self.access_info(&exposed, &mut object) {
            Ok(ai) => ai,
            Err(e) => {
                info!("prefix not configured for stat of {path}");
                return Err(e);
            }
        };
        if ai.bucket_name.is_empty() {
            return Err(Error::from_errno(libc::EINVAL));
        }

        let object = trim_slashes(&object).to_string();
        if object.is_empty() {
            return Ok(FileInfo::directory());
        }

        let listing = S3List::new(&ai, &object, 1)?
            .send(&self.engine, "")
            .await
            .map_err(|e| {
                info!("failed to stat path {path}: {e} [{}]", e.tag());
                e
            })?;

        if let Some(found) = listing.objects.iter().find(|o| o.key == object) {
            return Ok(FileInfo::regular(found.size, 0));
        }

        let desired_prefix = format!("{object}/");
        if listing.common_prefixes.iter().any(|p| *p == desired_prefix) {
            return Ok(FileInfo::directory());
        }

        Err(Error::from_errno(libc::ENOENT))
    }

    async fn create(
        &self,
        _tid: &str,
        path: &str,
        _mode: u32,
        _env: &OpenEnv,
        _opts: i32,
    ) -> Result<()> {
        // Creating the object here would cost a round-trip and expose an
        // empty file; the upload machinery materializes it instead.
        self.parse_path(path).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::oss::logging::LogMask;
    use crate::s3::access_info::UrlStyle;

    fn test_fs() -> Arc<S3Fs> {
        let info = S3AccessInfo {
            path_name: "/store".into(),
            service_name: "s3".into(),
            region: "us-east-1".into(),
            service_url: "https://s3.example.com".into(),
            url_style: UrlStyle::Path,
            bucket_name: "bkt".into(),
            ..Default::default()
        };
        let export = S3AccessInfo {
            path_name: "/all".into(),
            bucket_name: String::new(),
            ..info.clone()
        };
        let cfg = S3Config {
            endpoints: vec![info, export],
            mask: LogMask::default_mask(),
        };
        let engine = Engine::start(EngineConfig {
            workers: 1,
            ..EngineConfig::default()
        })
        .unwrap();
        S3Fs::new(engine, cfg)
    }

    #[tokio::test]
    async fn parse_path_finds_exposed_prefix() {
        let fs = test_fs();
        let (exposed, object) = fs.parse_path("/store/a/b.txt").unwrap();
        assert_eq!(exposed, "/store");
        assert_eq!(object, "a/b.txt");
    }

    #[tokio::test]
    async fn parse_path_unknown_prefix_is_enoent() {
        let fs = test_fs();
        let err = fs.parse_path("/other/a").unwrap_err();
        assert_eq!(err.neg_errno(), -libc::ENOENT);
    }

    #[tokio::test]
    async fn empty_bucket_takes_bucket_from_object() {
        let fs = test_fs();
        let (exposed, mut object) = fs.parse_path("/all/bucket7/key/name").unwrap();
        let ai = fs.access_info(&exposed, &mut object).unwrap();
        assert_eq!(ai.bucket_name, "bucket7");
        assert_eq!(object, "key/name");
    }

    #[tokio::test]
    async fn configured_bucket_leaves_object_alone() {
        let fs = test_fs();
        let (exposed, mut object) = fs.parse_path("/store/key/name").unwrap();
        let ai = fs.access_info(&exposed, &mut object).unwrap();
        assert_eq!(ai.bucket_name, "bkt");
        assert_eq!(object, "key/name");
    }
}
