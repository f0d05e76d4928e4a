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

//! Line-oriented configuration directives.
//!
//! The host framework owns tokenization of its config files; this reader
//! implements only what the adapters consume: one directive per line, the
//! leading dot-separated token selecting the sink, `#` starting a comment.

use crate::oss::error::{Error, Result};

/// One configuration line, split into its key and arguments.
#[derive(Clone, Debug)]
pub struct Directive {
    pub key: String,
    pub args: Vec<String>,
    /// Argument text with original spacing, for directives that carry
    /// quoted strings.
    pub raw_args: String,
}

impl Directive {
    /// First argument, or a configuration error naming the directive.
    pub fn require_arg(&self) -> Result<&str> {
        self.args
            .first()
            .map(String::as_str)
            .ok_or_else(|| Error::Config(format!("{} requires an argument", self.key)))
    }
}

/// A parsed configuration document.
#[derive(Clone, Debug, Default)]
pub struct ConfigDoc {
    directives: Vec<Directive>,
}

impl ConfigDoc {
    pub fn parse(text: &str) -> ConfigDoc {
        let mut directives = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, rest)) = split_first_token(line) else {
                continue;
            };
            directives.push(Directive {
                key: key.to_string(),
                args: rest.split_whitespace().map(str::to_string).collect(),
                raw_args: rest.trim_start().to_string(),
            });
        }
        ConfigDoc { directives }
    }

    /// Directives whose key starts with `prefix` followed by a `.`,
    /// in file order.
    pub fn section<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Directive> {
        self.directives.iter().filter(move |d| {
            d.key
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.directives.iter()
    }
}

fn split_first_token(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.find(char::is_whitespace) {
        Some(idx) => Some((&trimmed[..idx], &trimmed[idx..])),
        None => Some((trimmed, "")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_directives_and_skips_comments() {
        let doc = ConfigDoc::parse(
            "# a comment\n\
             httpserver.host_name example.org\n\
             \n\
             filter.glob -a /foo/** /bar/*.txt\n",
        );
        let dirs: Vec<_> = doc.iter().collect();
        assert_eq!(dirs.len(), 2);
        assert_eq!(dirs[0].key, "httpserver.host_name");
        assert_eq!(dirs[0].args, ["example.org"]);
        assert_eq!(dirs[1].args, ["-a", "/foo/**", "/bar/*.txt"]);
    }

    #[test]
    fn section_filters_by_sink() {
        let doc = ConfigDoc::parse(
            "posc.prefix /posc_test\n\
             poscx.prefix /other\n\
             posc.trace debug\n",
        );
        let keys: Vec<_> = doc.section("posc").map(|d| d.key.as_str()).collect();
        assert_eq!(keys, ["posc.prefix", "posc.trace"]);
    }

    #[test]
    fn raw_args_preserve_spacing() {
        let doc = ConfigDoc::parse(r#"prefixn2n.rule "/my store" "/data storage""#);
        let d = doc.iter().next().unwrap();
        assert_eq!(d.raw_args, r#""/my store" "/data storage""#);
    }
}
