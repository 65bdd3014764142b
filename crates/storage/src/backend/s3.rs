//! S3-compatible storage backend.
//!
//! This module provides a storage backend implementation for S3-compatible
//! services including AWS S3, Backblaze B2, Tigris (Fly.io), MinIO and
//! others. Objects report their ETag, which for single-part uploads is the
//! hex MD5 of the stored bytes.
//!
//! # Credentials
//!
//! Credentials are passed in explicitly; acquiring them is someone else's job.

use crate::backend::{BackendKind, ContentEncoding, FileInfoStream};
use crate::{
    FileInfo, StorageBackend,
    error::{Error, ErrorKind, Result},
    path::to_key,
    validate_path,
};
use async_stream::stream;
use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, Credentials, Region, http::HttpResponse, retry::RetryConfig},
    error::{DisplayErrorContext, SdkError},
    primitives::{ByteStream, DateTime},
};
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Generous default for concurrent S3 requests.
const DEFAULT_CONCURRENT_REQUESTS: usize = 100;

/// S3-compatible storage backend.
///
/// Stores files in an S3 bucket, optionally under a key prefix. All paths are
/// relative to the configured prefix (if any).
///
/// # Examples
///
/// ```no_run
/// use collectfast_storage::backend::S3Backend;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = S3Backend::new(
///     "assets",
///     "my-bucket",
///     Some("static/".to_string()),
///     "eu-west-1",
///     None::<String>,
///     "access_key_id",
///     "secret_access_key",
/// ).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct S3Backend {
    name: String,
    client: Client,
    bucket: String,
    prefix: Option<String>,
    /// Rate limiter for concurrent S3 requests.
    rate_limiter: Arc<Semaphore>,
}

impl S3Backend {
    /// Create a new S3 storage backend.
    ///
    /// # Arguments
    /// * `name` - A name for this backend (used in logging)
    /// * `bucket` - S3 bucket name
    /// * `prefix` - Optional key prefix (acts as virtual directory)
    /// * `region` - AWS region or provider-specific region
    /// * `endpoint` - Custom endpoint URL for S3-compatible services
    /// * `key_id` - Access key ID
    /// * `key_secret` - Secret access key
    pub async fn new(
        name: impl Into<String>,
        bucket: impl Into<String>,
        prefix: Option<String>,
        region: impl Into<String>,
        endpoint: Option<impl Into<String>>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Result<Self> {
        let prefix = prefix.map(|p| to_key(Path::new(&p))).transpose()?;
        let credentials = Credentials::new(key_id, key_secret, None, None, "collectfast-config");
        let mut config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region.into()))
            // 1 initial attempt + 3 retries with exponential backoff.
            .retry_config(RetryConfig::standard().with_max_attempts(4))
            // Path-style addressing for S3-compatible services.
            .force_path_style(true);
        if let Some(endpoint_url) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint_url);
        }
        Ok(Self {
            name: name.into(),
            client: Client::from_conf(config_builder.build()),
            bucket: bucket.into(),
            prefix,
            rate_limiter: Arc::new(Semaphore::new(DEFAULT_CONCURRENT_REQUESTS)),
        })
    }

    /// Construct the full S3 key from a relative path.
    fn full_key(&self, path: &Path) -> Result<String> {
        let key = to_key(path)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key,
        })
    }

    /// Strip the configured prefix from an S3 key to get relative path.
    fn relative_path(&self, key: &str) -> Result<PathBuf> {
        let relative = match &self.prefix {
            Some(prefix) => key.strip_prefix(prefix.as_str()).and_then(|s| s.strip_prefix('/')).unwrap_or(key),
            None => key,
        };
        validate_path(relative)
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        self.rate_limiter
            .clone()
            .acquire_owned()
            .await
            .or_raise(|| ErrorKind::BackendError("S3 rate limiter closed".to_string()))
    }

    fn parse_datetime(dt: &DateTime) -> Result<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(dt.as_nanos())
            .or_raise(|| ErrorKind::BackendError("S3 datetime out of range".to_string()))
    }

    /// Classify an SDK error by HTTP status, so a 404 is "absent" and
    /// everything else is "unknown".
    fn map_sdk_error<E>(err: SdkError<E, HttpResponse>, path: &Path) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let kind = match Self::status_of(&err) {
            Some(404) => ErrorKind::NotFound(path.to_path_buf()),
            Some(401) | Some(403) => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Network(DisplayErrorContext(&err).to_string()),
        };
        exn::Exn::from(kind)
    }

    fn status_of<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
        err.raw_response().map(|response| response.status().as_u16())
    }

    async fn put(&self, path: &Path, data: &[u8], encoding: Option<ContentEncoding>) -> Result<()> {
        let key = self.full_key(path)?;
        let content_type = mime_guess::from_path(path).first_or_octet_stream();
        let _permit = self.acquire_permit().await?;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type.essence_str())
            .set_content_encoding(encoding.map(|e| e.as_str().to_string()))
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, path))?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::ObjectStorage
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> FileInfoStream<'a> {
        // Trailing slash keeps prefix matching component based, like the
        // filesystem backends.
        let list_prefix = match prefix {
            Some(p) => match self.full_key(p) {
                Ok(key) => Some(format!("{key}/")),
                Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
            },
            None => self.prefix.as_ref().map(|p| format!("{p}/")),
        };

        Box::pin(stream! {
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(list_prefix)
                .into_paginator()
                .send();
            while let Some(page) = pages.next().await {
                let page = match page {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(exn::Exn::from(ErrorKind::Network(DisplayErrorContext(&e).to_string())));
                        return;
                    },
                };
                for object in page.contents() {
                    let Some(key) = object.key() else { continue };
                    // "Directory" placeholder objects.
                    if key.ends_with('/') {
                        continue;
                    }
                    let path = match self.relative_path(key) {
                        Ok(path) => path,
                        Err(e) => { yield Err(e); continue; },
                    };
                    let modified = match object.last_modified().map(Self::parse_datetime).transpose() {
                        Ok(modified) => modified.unwrap_or(OffsetDateTime::UNIX_EPOCH),
                        Err(e) => { yield Err(e); continue; },
                    };
                    let size = object.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0);
                    let info = FileInfo::new(path, size, modified);
                    yield Ok(match object.e_tag() {
                        Some(etag) => info.with_etag(etag),
                        None => info,
                    });
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, path))?;
        let body = output.body.collect().await.or_raise(|| ErrorKind::Network(format!("reading body of {key}")))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.put(path, data, None).await
    }

    async fn write_encoded(&self, path: &Path, data: &[u8], encoding: ContentEncoding) -> Result<()> {
        self.put(path, data, Some(encoding)).await
    }

    async fn stat(&self, path: &Path) -> Result<FileInfo> {
        let key = self.full_key(path)?;
        let _permit = self.acquire_permit().await?;
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, path))?;
        let modified = head
            .last_modified()
            .map(Self::parse_datetime)
            .transpose()?
            .ok_or_raise(|| ErrorKind::BackendError(format!("no Last-Modified for {key}")))?;
        let size = head.content_length().and_then(|s| u64::try_from(s).ok()).unwrap_or(0);
        let info = FileInfo::new(validate_path(path)?, size, modified);
        Ok(match head.e_tag() {
            Some(etag) => info.with_etag(etag),
            None => info,
        })
    }

    /// One conditional `HEAD` with `If-Match`: 200 is a match, 412 and 404
    /// are not.
    async fn digest_matches(&self, path: &Path, etag: &str) -> Result<bool> {
        let key = self.full_key(path)?;
        let quoted = format!("\"{}\"", etag.trim_matches('"'));
        let _permit = self.acquire_permit().await?;
        let result = self.client.head_object().bucket(&self.bucket).key(&key).if_match(quoted).send().await;
        match result {
            Ok(_) => Ok(true),
            Err(e) if matches!(Self::status_of(&e), Some(404 | 412)) => Ok(false),
            Err(e) => Err(Self::map_sdk_error(e, path)),
        }
    }
}
