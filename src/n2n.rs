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

//! Prefix-rewriting name mapper.
//!
//! An ordered rule list maps logical names to physical names by prefix
//! substitution.  Prefixes only match at path boundaries, never as bare
//! substrings.  Non-strict rules collapse runs of `/` in the result;
//! strict rules preserve them byte for byte.

use log::debug;

use crate::oss::config::ConfigDoc;
use crate::oss::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct MapRule {
    pub match_prefix: String,
    pub substitute_prefix: String,
    pub strict: bool,
}

/// The name mapper: rules plus an optional local root that `lfn2pfn`
/// prepends and `pfn2lfn` strips.
#[derive(Clone, Debug, Default)]
pub struct PrefixMapper {
    rules: Vec<MapRule>,
    local_root: String,
}

impl PrefixMapper {
    pub fn new(rules: Vec<MapRule>, local_root: Option<&str>) -> Self {
        let mut root = local_root.unwrap_or_default().to_string();
        while root.len() > 1 && root.ends_with('/') {
            root.pop();
        }
        let mapper = PrefixMapper {
            rules: rules
                .into_iter()
                .map(|r| MapRule {
                    match_prefix: normalize_for_match(&r.match_prefix),
                    substitute_prefix: normalize_for_match(&r.substitute_prefix),
                    strict: r.strict,
                })
                .collect(),
            local_root: root,
        };
        if mapper.rules.is_empty() {
            debug!("no name-map rules configured; all paths pass through unchanged");
        }
        mapper
    }

    /// Parses `prefixn2n.rule [-strict] <from> <to>` directives.
    /// Prefixes containing spaces use JSON string literal quoting.
    pub fn from_config(doc: &ConfigDoc, local_root: Option<&str>) -> Result<Self> {
        let mut rules = Vec::new();
        for directive in doc.section("prefixn2n") {
            if directive.key != "prefixn2n.rule" {
                return Err(Error::Config(format!(
                    "unknown configuration directive {}",
                    directive.key
                )));
            }
            let mut rest = directive.raw_args.trim_start();
            let mut strict = false;
            if let Some(after) = rest.strip_prefix("-strict") {
                if after.is_empty() || after.starts_with(char::is_whitespace) {
                    strict = true;
                    rest = after.trim_start();
                }
            }
            let (match_prefix, rest) = take_prefix_token(rest)?;
            let (substitute_prefix, rest) = take_prefix_token(rest.trim_start())?;
            if !rest.trim().is_empty() {
                return Err(Error::Config(format!(
                    "prefixn2n.rule takes two arguments; trailing input: {rest}"
                )));
            }
            debug!(
                "added name-map rule {match_prefix} -> {substitute_prefix}{}",
                if strict { " (strict)" } else { "" }
            );
            rules.push(MapRule {
                match_prefix,
                substitute_prefix,
                strict,
            });
        }
        Ok(Self::new(rules, local_root))
    }

    /// Logical name to physical name: apply the rules, then prepend the
    /// local root.
    pub fn lfn2pfn(&self, lfn: &str, buflen: usize) -> Result<String> {
        let mapped = self.apply_rules(lfn, true)?;
        let result = if self.local_root.is_empty() {
            mapped
        } else {
            format!("{}{}", self.local_root, mapped)
        };
        check_len(result, buflen)
    }

    /// Logical name to remote name: the rules alone, no local root.
    pub fn lfn2rfn(&self, lfn: &str, buflen: usize) -> Result<String> {
        let result = self.apply_rules(lfn, true)?;
        check_len(result, buflen)
    }

    /// Physical name back to logical name.
    pub fn pfn2lfn(&self, pfn: &str, buflen: usize) -> Result<String> {
        let stripped = if !self.local_root.is_empty() {
            pfn.strip_prefix(self.local_root.as_str()).unwrap_or(pfn)
        } else {
            pfn
        };
        let result = self.apply_rules(stripped, false)?;
        check_len(result, buflen)
    }

    fn apply_rules(&self, input: &str, forward: bool) -> Result<String> {
        // Trailing slash on the input is preserved on the output; a lone
        // "/" does not count as having one.
        let has_trailing_slash = input.len() > 1 && input.ends_with('/');

        // For strict rules the suffix keeps its internal slash runs; only
        // trailing slashes are trimmed for matching.
        let path_for_match = trim_trailing_slashes(input);
        let norm_path = normalize_for_match(input);

        for rule in &self.rules {
            let (from_prefix, to_prefix) = if forward {
                (&rule.match_prefix, &rule.substitute_prefix)
            } else {
                (&rule.substitute_prefix, &rule.match_prefix)
            };

            if !path_prefix_match(&norm_path, from_prefix) {
                continue;
            }

            let path_for_suffix = if rule.strict {
                path_for_match.as_str()
            } else {
                norm_path.as_str()
            };
            let suffix = if path_for_suffix.len() > from_prefix.len() {
                &path_for_suffix[from_prefix.len()..]
            } else {
                ""
            };

            let mut result = if from_prefix == "/" && !suffix.is_empty() && !suffix.starts_with('/')
            {
                format!("{to_prefix}/{suffix}")
            } else if to_prefix == "/" && suffix.starts_with('/') {
                suffix.to_string()
            } else {
                format!("{to_prefix}{suffix}")
            };

            if !rule.strict {
                result = normalize_slashes(&result);
            }
            if has_trailing_slash && !result.ends_with('/') {
                result.push('/');
            }
            return Ok(result);
        }

        // No rule matched; the path passes through unchanged.  Empty
        // input is treated as the root.
        Ok(if input.is_empty() {
            "/".to_string()
        } else {
            input.to_string()
        })
    }
}

fn check_len(result: String, buflen: usize) -> Result<String> {
    if result.len() >= buflen {
        return Err(Error::NameTooLong);
    }
    Ok(result)
}

fn trim_trailing_slashes(path: &str) -> String {
    let mut result = path.to_string();
    while result.len() > 1 && result.ends_with('/') {
        result.pop();
    }
    result
}

/// Strips trailing slashes; empty input becomes the root.
fn normalize_for_match(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    trim_trailing_slashes(path)
}

/// Collapses runs of consecutive `/` into a single one.
fn normalize_slashes(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut last_was_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !last_was_slash {
                result.push(c);
            }
            last_was_slash = true;
        } else {
            result.push(c);
            last_was_slash = false;
        }
    }
    result
}

/// A prefix matches at a path boundary only: exact, or followed by `/`.
fn path_prefix_match(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() || prefix == "/" {
        return prefix == "/" || path.is_empty();
    }
    let Some(rest) = path.strip_prefix(prefix) else {
        return false;
    };
    rest.is_empty() || rest.starts_with('/')
}

/// Reads one prefix token: a JSON string literal when quoted, a bare
/// word otherwise.  Returns the token and the remaining input.
fn take_prefix_token(input: &str) -> Result<(String, &str)> {
    if input.is_empty() {
        return Err(Error::Config(
            "prefixn2n.rule requires two arguments: matchPrefix substitutePrefix".into(),
        ));
    }
    if input.starts_with('"') {
        let end = find_json_string_end(input).ok_or_else(|| {
            Error::Config(format!("unterminated quoted string in prefixn2n.rule: {input}"))
        })?;
        let literal = &input[..=end];
        let parsed: String = serde_json::from_str(literal).map_err(|e| {
            Error::Config(format!("failed to parse JSON string {literal}: {e}"))
        })?;
        Ok((parsed, &input[end + 1..]))
    } else {
        let end = input
            .find(char::is_whitespace)
            .unwrap_or(input.len());
        Ok((input[..end].to_string(), &input[end..]))
    }
}

/// Index of the closing quote of a JSON string starting at byte 0.
fn find_json_string_end(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}
