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

//! Various utility and helper functions

use chrono::{DateTime, NaiveDateTime, ParseError, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};
pub use urlencoding::encode as urlencode;

use crate::oss::error::{Error, Result};

/// Date and time with UTC timezone
pub type UtcTime = DateTime<Utc>;

/// SHA-256 of the empty payload, used for bodyless requests.
pub const EMPTY_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Payload-hash literal for presigned URLs and streaming uploads.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Gets hex encoded SHA256 hash of given data
pub fn sha256_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Gets current UTC time
pub fn utc_now() -> UtcTime {
    chrono::offset::Utc::now()
}

/// Gets signer date value of given time
pub fn to_signer_date(time: UtcTime) -> String {
    time.format("%Y%m%d").to_string()
}

/// Gets AMZ date value of given time
pub fn to_amz_date(time: UtcTime) -> String {
    time.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Parses an RFC 1123 `Last-Modified` header value
pub fn from_http_header_value(s: &str) -> std::result::Result<UtcTime, ParseError> {
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(
        NaiveDateTime::parse_from_str(s, "%a, %d %b %Y %H:%M:%S GMT")?,
        Utc,
    ))
}

// RFC 3986 unreserved characters, with '/' additionally preserved so that
// object keys keep their path separators.  No path normalization is
// performed on S3 keys.
const OBJECT_KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Percent-encodes a canonical URI, preserving path separators.
pub fn uri_encode_path(path: &str) -> String {
    utf8_percent_encode(path, OBJECT_KEY_ENCODE_SET).collect()
}

/// Reads a short credential or token file, trimming surrounding whitespace.
pub fn read_short_file(path: &str) -> Result<String> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| Error::FileIo(format!("unable to read from '{path}': {e}")))?;
    Ok(contents.trim().to_string())
}

/// Strips leading and trailing slashes.
pub fn trim_slashes(s: &str) -> &str {
    s.trim_matches('/')
}

/// Last path component of a listing key, slash-trimmed.
pub fn final_component(key: &str) -> &str {
    trim_slashes(key)
        .rsplit('/')
        .next()
        .unwrap_or_default()
}
