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

//! Additive log-level sets configured through `*.trace` directives.
//!
//! Emission goes through the `log` facade; the mask only gates the
//! adapters' more expensive logging paths and records what the operator
//! asked for.

use crate::oss::error::{Error, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogMask(u32);

impl LogMask {
    pub const ERROR: LogMask = LogMask(1);
    pub const WARNING: LogMask = LogMask(1 | 2);
    pub const INFO: LogMask = LogMask(1 | 2 | 4);
    pub const DEBUG: LogMask = LogMask(1 | 2 | 4 | 8);
    pub const ALL: LogMask = LogMask(u32::MAX);
    pub const NONE: LogMask = LogMask(0);

    /// Default mask before any `trace` directive is seen.
    pub fn default_mask() -> LogMask {
        LogMask::WARNING
    }

    pub fn contains(self, other: LogMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn debug_enabled(self) -> bool {
        self.contains(LogMask::DEBUG)
    }

    fn union(self, other: LogMask) -> LogMask {
        LogMask(self.0 | other.0)
    }

    /// Parses the additive level list of a `trace` directive.
    ///
    /// Levels: `all|error|warning|info|debug|none`.  `none` clears the
    /// mask; every other token widens it.
    pub fn parse_levels<'a>(levels: impl IntoIterator<Item = &'a str>) -> Result<LogMask> {
        let mut mask = LogMask::NONE;
        let mut seen = false;
        for level in levels {
            seen = true;
            mask = match level {
                "all" => mask.union(LogMask::ALL),
                "error" => mask.union(LogMask::ERROR),
                "warning" => mask.union(LogMask::WARNING),
                "info" => mask.union(LogMask::INFO),
                "debug" => mask.union(LogMask::DEBUG),
                "none" => LogMask::NONE,
                other => {
                    return Err(Error::Config(format!(
                        "unknown trace level '{other}'; expected all|error|warning|info|debug|none"
                    )));
                }
            };
        }
        if !seen {
            return Err(Error::Config(
                "trace requires an argument: [all|error|warning|info|debug|none]".into(),
            ));
        }
        Ok(mask)
    }
}
