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

//! Pluggable storage adapters exposing HTTP/WebDAV and S3-compatible
//! object stores as a hierarchical, file-oriented namespace.
//!
//! The adapter families ([`http`], [`s3`]) translate open/read/write/
//! stat/readdir calls into authenticated HTTP requests driven by a
//! bounded worker-pool [`engine`].  The wrapper layers compose around
//! any [`oss::ObjectFs`]: [`posc`] stages creates into a hidden scratch
//! area and promotes them atomically on clean close, [`filter`] applies
//! a glob-based access policy, and [`n2n`] rewrites name prefixes.

pub mod engine;
pub mod filter;
pub mod http;
pub mod n2n;
pub mod oss;
pub mod posc;
pub mod s3;
pub mod signer;
pub mod stack;

#[cfg(test)]
mod signer_tests;

pub use engine::{Engine, EngineConfig};
pub use filter::FilterFs;
pub use http::HttpFs;
pub use n2n::PrefixMapper;
pub use oss::{DirEntry, Error, FileInfo, Identity, ObjectDir, ObjectFile, ObjectFs, OpenEnv, Result};
pub use posc::{PoscConfig, PoscFs};
pub use s3::S3Fs;
