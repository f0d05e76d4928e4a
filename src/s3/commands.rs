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

//! Signed S3 requests: host/URI synthesis, the protocol verbs, and the
//! XML documents they exchange.

use bytes::Bytes;
use http::Method;
use log::debug;
use serde::Deserialize;

use crate::engine::Engine;
use crate::engine::request::{HttpResponse, Request, RequestBody};
use crate::oss::error::{Error, Result};
use crate::oss::multimap::{Multimap, MultimapExt};
use crate::oss::utils::{
    EMPTY_SHA256, sha256_hash, to_amz_date, trim_slashes, uri_encode_path, utc_now,
};
use crate::s3::access_info::{S3AccessInfo, UrlStyle};
use crate::signer::{presign_v4, sign_v4_s3};

const DEFAULT_REGION: &str = "us-east-1";

/// A request against one S3 endpoint.
///
/// Construction parses the configured service URL and synthesizes the
/// host and canonical URI for the requested object; see the url_style
/// rules in the adapter documentation.
#[derive(Debug)]
pub struct S3Request {
    scheme: String,
    host: String,
    canonical_uri: String,
    /// URI for bucket-scoped operations such as listings.
    bucket_path: String,
    region: String,
    access_key_file: String,
    secret_key_file: String,
    pub(crate) query: Multimap,
    pub(crate) headers: Multimap,
    method: Method,
    expected_status: u16,
}

impl S3Request {
    pub fn new(ai: &S3AccessInfo, object: &str) -> Result<Self> {
        Self::with_retain(ai, object, true)
    }

    /// `retain_object` keeps the object name in the canonical URI for
    /// virtual-style requests; bucket-scoped commands drop it.
    pub fn with_retain(ai: &S3AccessInfo, object: &str, retain_object: bool) -> Result<Self> {
        let url = url::Url::parse(&ai.service_url)
            .map_err(|_| Error::InvalidServiceUrl(ai.service_url.clone()))?;
        let scheme = url.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            return Err(Error::InvalidServiceUrl(
                "service URL not of a known protocol (http[s])".into(),
            ));
        }
        let mut host = url
            .host_str()
            .ok_or_else(|| Error::InvalidServiceUrl("service URL has no host".into()))?
            .to_string();
        if let Some(port) = url.port() {
            host = format!("{host}:{port}");
        }
        let base = url.path().trim_end_matches('/').to_string();

        let object = trim_slashes(object);
        let (canonical_uri, bucket_path) = match ai.url_style {
            UrlStyle::Path => {
                if ai.bucket_name.is_empty() {
                    // The first path component of the object is the
                    // bucket; used when one prefix exports a whole
                    // endpoint.
                    let bucket = object.split('/').next().unwrap_or_default();
                    (join(&base, object), join(&base, bucket))
                } else {
                    let with_bucket = if object.is_empty() {
                        ai.bucket_name.clone()
                    } else {
                        format!("{}/{object}", ai.bucket_name)
                    };
                    (join(&base, &with_bucket), join(&base, &ai.bucket_name))
                }
            }
            UrlStyle::Virtual => {
                host = format!("{}.{host}", ai.bucket_name);
                let uri = if retain_object && !object.is_empty() {
                    join(&base, object)
                } else {
                    "/".to_string()
                };
                (uri, "/".to_string())
            }
        };

        let region = if !ai.region.is_empty() {
            ai.region.clone()
        } else {
            infer_region(&host).unwrap_or_else(|| DEFAULT_REGION.to_string())
        };

        Ok(S3Request {
            scheme,
            host,
            canonical_uri,
            bucket_path,
            region,
            access_key_file: ai.access_key_file.clone(),
            secret_key_file: ai.secret_key_file.clone(),
            query: Multimap::new(),
            headers: Multimap::new(),
            method: Method::GET,
            expected_status: 200,
        })
    }

    pub fn canonical_uri(&self) -> &str {
        &self.canonical_uri
    }

    pub fn bucket_path(&self) -> &str {
        &self.bucket_path
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn set_verb(&mut self, method: Method, expected_status: u16) {
        self.method = method;
        self.expected_status = expected_status;
    }

    /// Signs the request and hands it to the engine.
    ///
    /// Content-Type is pinned to binary/octet-stream.  An empty
    /// secret-key path sends the request unsigned (public buckets).
    async fn send(
        mut self,
        engine: &Engine,
        payload: Bytes,
        on_bucket: bool,
    ) -> Result<HttpResponse> {
        let path = if on_bucket {
            self.bucket_path.clone()
        } else {
            self.canonical_uri.clone()
        };
        let encoded_path = uri_encode_path(&path);

        let payload_hash = if payload.is_empty() {
            EMPTY_SHA256.to_string()
        } else {
            sha256_hash(&payload)
        };
        let now = utc_now();
        if !self.headers.contains_key("Content-Type") {
            self.headers.add("Content-Type", "binary/octet-stream");
        }
        self.headers.add("Host", self.host.clone());
        self.headers.add("x-amz-date", to_amz_date(now));
        self.headers.add("x-amz-content-sha256", payload_hash.clone());

        match load_credentials(&self.access_key_file, &self.secret_key_file)? {
            Some((access_key, secret_key)) => {
                sign_v4_s3(
                    &self.method,
                    &encoded_path,
                    &self.region,
                    &mut self.headers,
                    &self.query,
                    &access_key,
                    &secret_key,
                    &payload_hash,
                    now,
                );
            }
            None => {
                debug!("no secret key configured; sending unsigned request");
            }
        }

        let mut url = format!("{}://{}{encoded_path}", self.scheme, self.host);
        let query_string = self.query.get_canonical_query_string();
        if !query_string.is_empty() {
            url.push('?');
            url.push_str(&query_string);
        }

        let mut request = Request::new(self.method.clone(), url);
        request.headers = self.headers;
        request.expected_status = self.expected_status;

        let body = if payload.is_empty() {
            RequestBody::Empty
        } else {
            RequestBody::Full(payload)
        };
        engine.execute(request, body).await
    }
}

fn join(base: &str, rest: &str) -> String {
    if rest.is_empty() {
        if base.is_empty() {
            "/".to_string()
        } else {
            base.to_string()
        }
    } else {
        format!("{base}/{rest}")
    }
}

/// `s3.<region>.<suffix>` hosts carry their region in the second label.
pub(crate) fn infer_region(host: &str) -> Option<String> {
    let rest = host.strip_prefix("s3.")?;
    let region = rest.split('.').next()?;
    if region.is_empty() || rest == region {
        return None;
    }
    Some(region.to_string())
}

/// Loads the signing key pair; `Ok(None)` means the endpoint is
/// deliberately unauthenticated.
fn load_credentials(
    access_key_file: &str,
    secret_key_file: &str,
) -> Result<Option<(String, String)>> {
    if secret_key_file.is_empty() {
        return Ok(None);
    }
    let secret_key = crate::oss::utils::read_short_file(secret_key_file)?;
    if access_key_file.is_empty() {
        return Err(Error::FileIo(
            "the secret key was read, but no access key file is configured".into(),
        ));
    }
    let access_key = crate::oss::utils::read_short_file(access_key_file)?;
    Ok(Some((access_key, secret_key)))
}

// ---------------------------------------------------------------------------

/// HEAD on an object; size and mtime ride back in the headers.
pub struct S3Head(S3Request);

impl S3Head {
    pub fn new(ai: &S3AccessInfo, object: &str) -> Result<Self> {
        Ok(S3Head(S3Request::new(ai, object)?))
    }

    pub async fn send(mut self, engine: &Engine) -> Result<HttpResponse> {
        self.0.set_verb(Method::HEAD, 200);
        self.0.send(engine, Bytes::new(), false).await
    }
}

// ---------------------------------------------------------------------------

/// GET of a whole object or a byte range.
pub struct S3Download(S3Request);

impl S3Download {
    pub fn new(ai: &S3AccessInfo, object: &str) -> Result<Self> {
        Ok(S3Download(S3Request::new(ai, object)?))
    }

    pub async fn send(mut self, engine: &Engine, offset: u64, size: usize) -> Result<Bytes> {
        if offset != 0 || size != 0 {
            self.0
                .headers
                .add("Range", format!("bytes={}-{}", offset, offset + size as u64 - 1));
            self.0.set_verb(Method::GET, 206);
        } else {
            self.0.set_verb(Method::GET, 200);
        }
        Ok(self.0.send(engine, Bytes::new(), false).await?.body)
    }
}

// ---------------------------------------------------------------------------

/// Single-shot PUT of a whole object.
pub struct S3Upload(S3Request);

impl S3Upload {
    pub fn new(ai: &S3AccessInfo, object: &str) -> Result<Self> {
        Ok(S3Upload(S3Request::new(ai, object)?))
    }

    pub async fn send(mut self, engine: &Engine, payload: Bytes) -> Result<HttpResponse> {
        self.0.set_verb(Method::PUT, 200);
        self.0.send(engine, payload, false).await
    }
}

// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct InitiateMultipartUploadResult {
    pub(crate) upload_id: String,
}

/// POST `?uploads` establishing a multipart upload.
pub struct S3CreateMultipartUpload(S3Request);

impl S3CreateMultipartUpload {
    pub fn new(ai: &S3AccessInfo, object: &str) -> Result<Self> {
        Ok(S3CreateMultipartUpload(S3Request::new(ai, object)?))
    }

    /// Returns the upload id issued by the server.
    pub async fn send(mut self, engine: &Engine) -> Result<String> {
        self.0.query.add("uploads", "");
        self.0.query.add("x-id", "CreateMultipartUpload");
        self.0.set_verb(Method::POST, 200);
        let response = self.0.send(engine, Bytes::new(), false).await?;

        let parsed: InitiateMultipartUploadResult =
            quick_xml::de::from_reader(response.body.as_ref()).map_err(|e| {
                Error::Internal(format!("malformed InitiateMultipartUploadResult: {e}"))
            })?;
        if parsed.upload_id.is_empty() {
            return Err(Error::Internal(
                "InitiateMultipartUploadResult is missing <UploadId>".into(),
            ));
        }
        Ok(parsed.upload_id)
    }
}

// ---------------------------------------------------------------------------

/// PUT `?partNumber=<k>&uploadId=<U>`; the part's ETag is captured from
/// the response headers.
pub struct S3SendMultipartPart(S3Request);

impl S3SendMultipartPart {
    pub fn new(ai: &S3AccessInfo, object: &str) -> Result<Self> {
        Ok(S3SendMultipartPart(S3Request::new(ai, object)?))
    }

    pub async fn send(
        mut self,
        engine: &Engine,
        payload: Bytes,
        part_number: usize,
        upload_id: &str,
    ) -> Result<String> {
        self.0.query.add("partNumber", part_number.to_string());
        self.0.query.add("uploadId", upload_id);
        self.0.set_verb(Method::PUT, 200);
        let response = self.0.send(engine, payload, false).await?;
        response
            .etag()
            .ok_or_else(|| Error::Internal("part upload response carried no ETag".into()))
    }
}

// ---------------------------------------------------------------------------

/// POST `?uploadId=<U>` assembling the uploaded parts.
pub struct S3CompleteMultipartUpload(S3Request);

impl S3CompleteMultipartUpload {
    pub fn new(ai: &S3AccessInfo, object: &str) -> Result<Self> {
        Ok(S3CompleteMultipartUpload(S3Request::new(ai, object)?))
    }

    pub async fn send(
        mut self,
        engine: &Engine,
        etags: &[String],
        upload_id: &str,
    ) -> Result<HttpResponse> {
        self.0.query.add("uploadId", upload_id);
        self.0.set_verb(Method::POST, 200);
        self.0
            .send(engine, Bytes::from(complete_payload(etags)), false)
            .await
    }
}

/// ETags are listed in capture order; part numbers are 1-based.
pub(crate) fn complete_payload(etags: &[String]) -> String {
    let mut payload =
        String::from("<CompleteMultipartUpload xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">");
    for (idx, etag) in etags.iter().enumerate() {
        payload.push_str("<Part>");
        payload.push_str(&format!("<ETag>{etag}</ETag>"));
        payload.push_str(&format!("<PartNumber>{}</PartNumber>", idx + 1));
        payload.push_str("</Part>");
    }
    payload.push_str("</CompleteMultipartUpload>");
    payload
}

// ---------------------------------------------------------------------------

/// DELETE `?uploadId=<U>` discarding an upload after a failure.
pub struct S3AbortMultipartUpload(S3Request);

impl S3AbortMultipartUpload {
    pub fn new(ai: &S3AccessInfo, object: &str) -> Result<Self> {
        Ok(S3AbortMultipartUpload(S3Request::new(ai, object)?))
    }

    pub async fn send(mut self, engine: &Engine, upload_id: &str) -> Result<()> {
        self.0.query.add("uploadId", upload_id);
        self.0.set_verb(Method::DELETE, 204);
        self.0.send(engine, Bytes::new(), false).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------

/// Produces a URL with an embedded V4 signature, valid for a bounded
/// window without client credentials.
pub struct S3Presign(S3Request);

impl S3Presign {
    pub fn new(ai: &S3AccessInfo, object: &str) -> Result<Self> {
        Ok(S3Presign(S3Request::new(ai, object)?))
    }

    /// Signed URL for `method`, expiring after `expires` seconds.
    pub fn url(self, method: &Method, expires: u32) -> Result<String> {
        self.url_at(method, expires, utc_now())
    }

    pub(crate) fn url_at(
        mut self,
        method: &Method,
        expires: u32,
        date: crate::oss::utils::UtcTime,
    ) -> Result<String> {
        let (access_key, secret_key) =
            load_credentials(&self.0.access_key_file, &self.0.secret_key_file)?.ok_or_else(
                || Error::FileIo("presigning requires configured credentials".into()),
            )?;

        let encoded_path = uri_encode_path(&self.0.canonical_uri);
        presign_v4(
            method,
            &self.0.host,
            &encoded_path,
            &self.0.region,
            &mut self.0.query,
            &access_key,
            &secret_key,
            date,
            expires,
        );

        Ok(format!(
            "{}://{}{encoded_path}?{}",
            self.0.scheme,
            self.0.host,
            self.0.query.get_canonical_query_string()
        ))
    }
}

// ---------------------------------------------------------------------------

/// One key in a listing.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ObjectEntry {
    pub key: String,
    pub size: i64,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase", default)]
struct CommonPrefix {
    prefix: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct ListBucketResult {
    contents: Vec<ObjectEntry>,
    common_prefixes: Vec<CommonPrefix>,
    next_continuation_token: Option<String>,
    is_truncated: bool,
}

/// A parsed page of a bucket listing.
#[derive(Clone, Debug, Default)]
pub struct Listing {
    /// Keys below the prefix with no further `/`.
    pub objects: Vec<ObjectEntry>,
    /// Subdirectory-like pseudo entries.
    pub common_prefixes: Vec<String>,
    /// Empty when the listing is complete.
    pub continuation_token: String,
    pub truncated: bool,
}

/// GET `?list-type=2&delimiter=/` over the bucket.
pub struct S3List {
    request: S3Request,
    prefix: String,
    max_keys: usize,
}

impl S3List {
    pub fn new(ai: &S3AccessInfo, prefix: &str, max_keys: usize) -> Result<Self> {
        Ok(S3List {
            request: S3Request::with_retain(ai, prefix, false)?,
            prefix: prefix.to_string(),
            max_keys,
        })
    }

    pub async fn send(mut self, engine: &Engine, continuation_token: &str) -> Result<Listing> {
        self.request.query.add("list-type", "2");
        self.request.query.add("delimiter", "/");
        self.request.query.add("prefix", self.prefix.clone());
        if !continuation_token.is_empty() {
            self.request.query.add("continuation-token", continuation_token);
        }
        self.request.query.add("max-keys", self.max_keys.to_string());
        self.request.set_verb(Method::GET, 200);

        let response = self.request.send(engine, Bytes::new(), true).await?;
        parse_listing(&response.body)
    }
}

pub(crate) fn parse_listing(body: &[u8]) -> Result<Listing> {
    let parsed: ListBucketResult = quick_xml::de::from_reader(body)
        .map_err(|e| Error::Internal(format!("malformed ListBucketResult: {e}")))?;

    let continuation_token = if parsed.is_truncated {
        parsed.next_continuation_token.unwrap_or_default()
    } else {
        String::new()
    };
    Ok(Listing {
        objects: parsed
            .contents
            .into_iter()
            .filter(|o| !o.key.trim().is_empty())
            .collect(),
        common_prefixes: parsed
            .common_prefixes
            .into_iter()
            .map(|p| p.prefix.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        continuation_token,
        truncated: parsed.is_truncated,
    })
}
