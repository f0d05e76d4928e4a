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

//! Header and query-parameter maps with the canonicalization rules the
//! signature algorithm requires.

use std::collections::BTreeMap;

use multimap::MultiMap;

use crate::oss::utils::urlencode;

/// Multimap for string key and string value
pub type Multimap = MultiMap<String, String>;

pub trait MultimapExt {
    /// Adds a key-value pair to the multimap
    fn add<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V);

    /// Converts multimap to HTTP query string
    fn to_query_string(&self) -> String;

    /// Converts multimap to canonical query string
    fn get_canonical_query_string(&self) -> String;

    /// Converts multimap to signed headers and canonical headers
    fn get_canonical_headers(&self) -> (String, String);
}

impl MultimapExt for Multimap {
    fn add<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.insert(key.into(), value.into());
    }

    fn to_query_string(&self) -> String {
        let mut query = String::new();
        for (key, values) in self.iter_all() {
            for value in values {
                if !query.is_empty() {
                    query.push('&');
                }
                query.push_str(&urlencode(key));
                if !value.is_empty() {
                    query.push('=');
                    query.push_str(&urlencode(value));
                }
            }
        }
        query
    }

    fn get_canonical_query_string(&self) -> String {
        let mut params: Vec<(String, String)> = Vec::new();
        for (key, values) in self.iter_all() {
            for value in values {
                params.push((urlencode(key).into_owned(), urlencode(value).into_owned()));
            }
        }
        params.sort();

        let mut query = String::new();
        for (key, value) in params {
            if !query.is_empty() {
                query.push('&');
            }
            query.push_str(&key);
            query.push('=');
            query.push_str(&value);
        }
        query
    }

    fn get_canonical_headers(&self) -> (String, String) {
        let mut btmap: BTreeMap<String, String> = BTreeMap::new();

        for (k, values) in self.iter_all() {
            let key = k.to_lowercase();
            if "authorization" == key || "user-agent" == key {
                continue;
            }

            let mut vs = values.clone();
            vs.sort();

            let mut value = String::new();
            for v in vs {
                // Empty header values are placeholders used to suppress a
                // header on the wire; they never participate in signing.
                if v.is_empty() {
                    continue;
                }
                if !value.is_empty() {
                    value.push(',');
                }
                // Trim and collapse internal runs of spaces.
                let collapsed = v.split_whitespace().collect::<Vec<_>>().join(" ");
                value.push_str(&collapsed);
            }
            if value.is_empty() {
                continue;
            }
            btmap.insert(key, value);
        }

        let mut signed_headers = String::new();
        let mut canonical_headers = String::new();
        let mut add_delim = false;
        for (key, value) in &btmap {
            if add_delim {
                signed_headers.push(';');
                canonical_headers.push('\n');
            }

            signed_headers.push_str(key);

            canonical_headers.push_str(key);
            canonical_headers.push(':');
            canonical_headers.push_str(value);

            add_delim = true;
        }

        (signed_headers, canonical_headers)
    }
}
