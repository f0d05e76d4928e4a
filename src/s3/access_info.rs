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

//! Per-endpoint S3 access configuration.

use crate::oss::config::ConfigDoc;
use crate::oss::error::{Error, Result};
use crate::oss::logging::LogMask;
use crate::oss::utils::read_short_file;

/// Addressing style for bucket requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UrlStyle {
    #[default]
    Path,
    Virtual,
}

impl UrlStyle {
    pub fn parse(value: &str) -> Result<UrlStyle> {
        match value.to_lowercase().as_str() {
            "path" => Ok(UrlStyle::Path),
            "virtual" => Ok(UrlStyle::Virtual),
            other => Err(Error::Config(format!(
                "invalid s3.url_style '{other}'; must be 'virtual' or 'path'"
            ))),
        }
    }
}

/// One configured S3 endpoint, exported at `path_name`.
#[derive(Clone, Debug, Default)]
pub struct S3AccessInfo {
    pub path_name: String,
    pub service_name: String,
    pub region: String,
    pub service_url: String,
    pub url_style: UrlStyle,
    /// Empty means the first path component of the object names the
    /// bucket (whole-endpoint export).
    pub bucket_name: String,
    pub access_key_file: String,
    pub secret_key_file: String,
}

impl S3AccessInfo {
    fn validate(&self) -> Result<()> {
        if self.path_name.is_empty() {
            return Err(Error::Config("s3.path_name not specified".into()));
        }
        if self.service_name.is_empty() {
            return Err(Error::Config("s3.service_name not specified".into()));
        }
        if self.region.is_empty() {
            return Err(Error::Config("s3.region not specified".into()));
        }
        if self.service_url.is_empty() {
            return Err(Error::Config("s3.service_url not specified".into()));
        }
        // Credential files must be readable up front so a bad deployment
        // fails at initialization rather than on the first request.
        if !self.access_key_file.is_empty() {
            read_short_file(&self.access_key_file)
                .map_err(|_| Error::Config("s3.access_key_file not readable".into()))?;
        }
        if !self.secret_key_file.is_empty() {
            read_short_file(&self.secret_key_file)
                .map_err(|_| Error::Config("s3.secret_key_file not readable".into()))?;
        }
        Ok(())
    }
}

/// Parsed `s3.*` configuration: the endpoint groups plus the log mask.
#[derive(Clone, Debug, Default)]
pub struct S3Config {
    pub endpoints: Vec<S3AccessInfo>,
    pub mask: LogMask,
}

impl S3Config {
    /// Parses `s3.begin` … `s3.end` groups.
    pub fn from_config(doc: &ConfigDoc) -> Result<S3Config> {
        let mut cfg = S3Config {
            endpoints: Vec::new(),
            mask: LogMask::default_mask(),
        };
        let mut current: Option<S3AccessInfo> = None;

        for directive in doc.section("s3") {
            let key = directive.key.as_str();
            if key == "s3.trace" {
                cfg.mask = LogMask::parse_levels(directive.args.iter().map(String::as_str))?;
                continue;
            }
            if key == "s3.begin" {
                if current.is_some() {
                    return Err(Error::Config("nested s3.begin".into()));
                }
                current = Some(S3AccessInfo::default());
                continue;
            }
            if key == "s3.end" {
                let info = current
                    .take()
                    .ok_or_else(|| Error::Config("s3.end without s3.begin".into()))?;
                info.validate()?;
                cfg.endpoints.push(info);
                continue;
            }

            let info = current
                .as_mut()
                .ok_or_else(|| Error::Config(format!("{key} outside s3.begin/s3.end")))?;
            let value = directive.require_arg()?;
            match key {
                "s3.path_name" => {
                    // Normalize so every exported path starts with '/'.
                    info.path_name = if value.starts_with('/') {
                        value.to_string()
                    } else {
                        format!("/{value}")
                    };
                }
                "s3.service_name" => info.service_name = value.to_string(),
                "s3.region" => info.region = value.to_string(),
                "s3.service_url" => info.service_url = value.to_string(),
                "s3.url_style" => info.url_style = UrlStyle::parse(value)?,
                "s3.bucket_name" => info.bucket_name = value.to_string(),
                "s3.access_key_file" => info.access_key_file = value.to_string(),
                "s3.secret_key_file" => info.secret_key_file = value.to_string(),
                other => {
                    return Err(Error::Config(format!(
                        "unknown configuration directive {other}"
                    )));
                }
            }
        }

        if current.is_some() {
            return Err(Error::Config("s3.begin without matching s3.end".into()));
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> &'static str {
        "s3.begin\n\
         s3.path_name store\n\
         s3.service_name s3\n\
         s3.region us-west-2\n\
         s3.service_url https://s3.example.com\n\
         s3.url_style path\n\
         s3.bucket_name mybucket\n\
         s3.end\n"
    }

    #[test]
    fn parses_endpoint_group() {
        let doc = ConfigDoc::parse(sample_config());
        let cfg = S3Config::from_config(&doc).unwrap();
        assert_eq!(cfg.endpoints.len(), 1);
        let info = &cfg.endpoints[0];
        assert_eq!(info.path_name, "/store");
        assert_eq!(info.region, "us-west-2");
        assert_eq!(info.url_style, UrlStyle::Path);
        assert_eq!(info.bucket_name, "mybucket");
    }

    #[test]
    fn missing_required_key_fails() {
        let doc = ConfigDoc::parse(
            "s3.begin\n\
             s3.path_name store\n\
             s3.service_name s3\n\
             s3.service_url https://s3.example.com\n\
             s3.url_style path\n\
             s3.end\n",
        );
        assert!(S3Config::from_config(&doc).is_err());
    }

    #[test]
    fn url_style_is_case_insensitive_and_checked() {
        assert_eq!(UrlStyle::parse("Virtual").unwrap(), UrlStyle::Virtual);
        assert_eq!(UrlStyle::parse("PATH").unwrap(), UrlStyle::Path);
        assert!(UrlStyle::parse("dns").is_err());
    }

    #[test]
    fn unterminated_group_fails() {
        let doc = ConfigDoc::parse("s3.begin\ns3.path_name store\n");
        assert!(S3Config::from_config(&doc).is_err());
    }

    #[test]
    fn directive_outside_group_fails() {
        let doc = ConfigDoc::parse("s3.region us-east-1\n");
        assert!(S3Config::from_config(&doc).is_err());
    }
}
