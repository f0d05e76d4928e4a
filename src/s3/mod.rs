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

//! S3-compatible adapter: request layer, multipart uploads, and the
//! virtual-directory view over flat buckets.

pub mod access_info;
pub mod commands;
pub mod dir;
pub mod file;
pub mod fs;

#[cfg(test)]
mod commands_tests;

pub use access_info::{S3AccessInfo, S3Config, UrlStyle};
pub use fs::S3Fs;
