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

//! Error definitions shared by every adapter layer.

use thiserror::Error;

/// Errors produced by the request engine, the protocol layers and the
/// filesystem wrappers.
///
/// Each variant carries a stable tag (see [`Error::tag`]) used in log
/// output, and translates to a negated POSIX errno at the filesystem
/// surface via [`Error::errno`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid service URL: {0}")]
    InvalidServiceUrl(String),

    #[error("file I/O error: {0}")]
    FileIo(String),

    #[error("transport setup failed: {0}")]
    TransportSetup(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP response {status} not expected {expected}: {body}")]
    HttpStatusUnexpected {
        status: u16,
        expected: u16,
        body: String,
    },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("request rate limit exceeded and retry consumed")]
    RequestLimitExceeded,

    #[error("token error: {0}")]
    Token(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("logic error: {0}")]
    Logic(String),

    #[error("result does not fit in the provided buffer")]
    NameTooLong,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// Filesystem-surface error already expressed as a POSIX errno.
    ///
    /// Wrappers use this to pass through codes such as `EISDIR` or `EBADF`
    /// that have no transport-level counterpart.
    #[error("errno {0}")]
    Posix(i32),
}

impl Error {
    /// Stable tag identifying the error kind in log lines.
    pub fn tag(&self) -> &'static str {
        match self {
            Error::InvalidServiceUrl(_) => "E_INVALID_SERVICE_URL",
            Error::FileIo(_) => "E_FILE_IO",
            Error::TransportSetup(_) => "E_TRANSPORT_SETUP",
            Error::Transport(_) => "E_TRANSPORT",
            Error::HttpStatusUnexpected { .. } => "E_HTTP_RESPONSE_NOT_EXPECTED",
            Error::Timeout(_) => "E_TIMEOUT",
            Error::RequestLimitExceeded => "E_REQUEST_LIMIT_EXCEEDED",
            Error::Token(_) => "E_TOKEN",
            Error::NotImplemented(_) => "E_NOT_IMPL",
            Error::Logic(_) => "E_LOGIC",
            Error::NameTooLong => "E_NAME_TOO_LONG",
            Error::Config(_) => "E_CONFIG",
            Error::Internal(_) => "E_INTERNAL",
            Error::Posix(_) => "E_POSIX",
        }
    }

    /// Translates the error to a positive POSIX errno.
    ///
    /// The filesystem surface reports failures as the negated value.
    /// HTTP status codes follow the original mapping: 404 becomes
    /// `ENOENT`, 403 becomes `EPERM`, everything else is `EIO`.
    pub fn errno(&self) -> i32 {
        match self {
            Error::HttpStatusUnexpected { status, .. } => match status {
                404 => libc::ENOENT,
                403 => libc::EPERM,
                _ => libc::EIO,
            },
            Error::Timeout(_) => libc::ETIMEDOUT,
            Error::NameTooLong => libc::ENAMETOOLONG,
            Error::NotImplemented(_) => libc::ENOSYS,
            Error::Posix(e) => *e,
            _ => libc::EIO,
        }
    }

    /// Negated errno for direct return on the filesystem surface.
    pub fn neg_errno(&self) -> i32 {
        -self.errno()
    }

    /// Shorthand for a pass-through POSIX error.
    pub fn from_errno(errno: i32) -> Self {
        Error::Posix(errno)
    }

    /// The HTTP status carried by this error, when one was received.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::HttpStatusUnexpected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() || err.is_request() {
            Error::TransportSetup(err.to_string())
        } else if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else {
            Error::Transport(err.to_string())
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidServiceUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_errno_mapping() {
        let not_found = Error::HttpStatusUnexpected {
            status: 404,
            expected: 200,
            body: String::new(),
        };
        assert_eq!(not_found.neg_errno(), -libc::ENOENT);

        let denied = Error::HttpStatusUnexpected {
            status: 403,
            expected: 200,
            body: String::new(),
        };
        assert_eq!(denied.neg_errno(), -libc::EPERM);

        let server = Error::HttpStatusUnexpected {
            status: 500,
            expected: 200,
            body: String::new(),
        };
        assert_eq!(server.neg_errno(), -libc::EIO);
    }

    #[test]
    fn transport_errors_are_eio() {
        assert_eq!(Error::Transport("reset".into()).neg_errno(), -libc::EIO);
        assert_eq!(Error::Internal("bug".into()).neg_errno(), -libc::EIO);
    }

    #[test]
    fn tags_are_stable() {
        assert_eq!(Error::Timeout("t".into()).tag(), "E_TIMEOUT");
        assert_eq!(Error::NameTooLong.tag(), "E_NAME_TOO_LONG");
        assert_eq!(Error::RequestLimitExceeded.tag(), "E_REQUEST_LIMIT_EXCEEDED");
    }
}
