//! Object storage access: opening a key for streaming read (transparently
//! gzip-decompressed when its name says so) and listing a bucket prefix
//! for the backfill path.

use std::pin::Pin;

use async_compression::tokio::bufread::GzipDecoder;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, BufReader};

use crate::errors::ObjectStoreError;

/// Bucket + key, with the region and listing-prefix context carried along
/// so a bucket-listing `ObjectRef` (no owning queue message) still knows
/// where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
    pub region: Option<String>,
    pub prefix: Option<String>,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            region: None,
            prefix: None,
        }
    }

    pub fn is_gzip(&self) -> bool {
        self.key.ends_with(".gz")
    }
}

pub type BoxedAsyncRead = Pin<Box<dyn AsyncRead + Send + Unpin>>;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn open(&self, object: &ObjectRef) -> Result<BoxedAsyncRead, ObjectStoreError>;

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        since: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ObjectRef>, ObjectStoreError>;
}

pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn open(&self, object: &ObjectRef) -> Result<BoxedAsyncRead, ObjectStoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await
            .map_err(|err| ObjectStoreError::Open {
                bucket: object.bucket.clone(),
                key: object.key.clone(),
                detail: err.to_string(),
            })?;

        let reader = output.body.into_async_read();

        if object.is_gzip() {
            let decoder = GzipDecoder::new(BufReader::new(reader));
            Ok(Box::pin(decoder))
        } else {
            Ok(Box::pin(reader))
        }
    }

    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        since: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<ObjectRef>, ObjectStoreError> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let output = request.send().await.map_err(|err| ObjectStoreError::List {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                detail: err.to_string(),
            })?;

            for object in output.contents() {
                let Some(key) = object.key() else { continue };
                if let Some(last_modified) = object.last_modified() {
                    let last_modified_utc: DateTime<Utc> =
                        aws_smithy_types_convert::date_time::DateTimeExt::to_chrono_utc(
                            last_modified,
                        )
                        .map_err(|err| ObjectStoreError::List {
                            bucket: bucket.to_string(),
                            prefix: prefix.to_string(),
                            detail: err.to_string(),
                        })?;
                    if since.is_some_and(|s| last_modified_utc < s) {
                        continue;
                    }
                    if to.is_some_and(|t| last_modified_utc > t) {
                        continue;
                    }
                }
                objects.push(ObjectRef {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    region: None,
                    prefix: Some(prefix.to_string()),
                });
            }

            continuation_token = output.next_continuation_token().map(str::to_string);
            if continuation_token.is_none() {
                break;
            }
        }

        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_detection_is_suffix_based() {
        assert!(ObjectRef::new("b", "logs/2024/file.log.gz").is_gzip());
        assert!(!ObjectRef::new("b", "logs/2024/file.log").is_gzip());
    }
}
