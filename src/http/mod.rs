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

//! HTTP/WebDAV adapter: typed protocol verbs and the file, directory and
//! filesystem objects built on them.

pub mod commands;
pub mod dir;
pub mod file;
pub mod fs;
pub mod token;

#[cfg(test)]
mod http_tests;

pub use fs::{HttpFs, HttpFsConfig};
