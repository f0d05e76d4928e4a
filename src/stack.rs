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

//! Assembles a full adapter stack from one configuration document.
//!
//! The composition order mirrors the request path: the filter sits on
//! the outside, the persist-on-successful-close layer beneath it, and
//! the S3 or HTTP adapter at the bottom.  Configuration errors fail
//! assembly synchronously.

use std::sync::Arc;

use crate::engine::Engine;
use crate::filter::FilterFs;
use crate::http::HttpFs;
use crate::oss::api::ObjectFs;
use crate::oss::config::ConfigDoc;
use crate::oss::error::{Error, Result};
use crate::posc::{PoscConfig, PoscFs};
use crate::s3::S3Fs;

/// Builds the adapter stack the document describes.
///
/// Exactly one of the `s3.*` or `httpserver.*` sections selects the
/// bottom adapter; `posc.prefix` and `filter.*` add their wrappers.
/// Unrelated sections (for example a host framework's own directives)
/// are ignored.
pub async fn assemble(engine: Arc<Engine>, doc: &ConfigDoc) -> Result<Arc<dyn ObjectFs>> {
    let has_s3 = doc.section("s3").next().is_some();
    let has_http = doc.section("httpserver").next().is_some();

    let mut fs: Arc<dyn ObjectFs> = match (has_s3, has_http) {
        (true, false) => Arc::new(S3Fs::from_config(Arc::clone(&engine), doc)?),
        (false, true) => Arc::new(HttpFs::from_config(Arc::clone(&engine), doc)?),
        (true, true) => {
            return Err(Error::Config(
                "both s3.* and httpserver.* configured; pick one storage adapter".into(),
            ));
        }
        (false, false) => {
            return Err(Error::Config(
                "no storage adapter configured; s3.* or httpserver.* directives are required"
                    .into(),
            ));
        }
    };

    if doc.section("posc").next().is_some() {
        let posc = PoscFs::start(fs, PoscConfig::from_config(doc)?).await?;
        fs = Arc::new(posc);
    }

    if doc.section("filter").next().is_some() {
        fs = Arc::new(FilterFs::from_config(fs, doc)?);
    }

    Ok(fs)
}
