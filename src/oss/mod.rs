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

//! The storage surface and the plumbing shared by every adapter.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod multimap;
pub mod utils;

#[cfg(test)]
pub mod memfs;
#[cfg(test)]
pub mod testserver;

pub use api::{DirEntry, FileInfo, Identity, ObjectDir, ObjectFile, ObjectFs, OpenEnv};
pub use error::{Error, Result};
