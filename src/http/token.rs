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

//! Bearer-token source backed by a file on disk.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::oss::error::{Error, Result};

const TOKEN_EXPIRY: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct TokenCache {
    token: Option<String>,
    loaded_at: Option<Instant>,
}

/// Re-reads the token file once the cached copy is older than 5 seconds.
///
/// Blank lines and `#` comments are skipped; the first remaining line is
/// the token.  A readable file with no token lines means "no token" and
/// is not an error.
#[derive(Debug)]
pub struct TokenFile {
    path: Option<String>,
    cache: RwLock<TokenCache>,
}

impl TokenFile {
    pub fn new(path: impl Into<String>) -> Self {
        TokenFile {
            path: Some(path.into()),
            cache: RwLock::new(TokenCache::default()),
        }
    }

    /// A source that never yields a token.
    pub fn none() -> Self {
        TokenFile {
            path: None,
            cache: RwLock::new(TokenCache::default()),
        }
    }

    pub fn get(&self) -> Result<Option<String>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };

        {
            let cache = self.cache.read().unwrap();
            if let Some(loaded_at) = cache.loaded_at {
                if loaded_at.elapsed() <= TOKEN_EXPIRY {
                    return Ok(cache.token.clone());
                }
            }
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Token(format!("failed to read token authorization file: {e}"))
        })?;
        let token = contents
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string);

        let mut cache = self.cache.write().unwrap();
        cache.token = token.clone();
        cache.loaded_at = Some(Instant::now());
        Ok(token)
    }
}
