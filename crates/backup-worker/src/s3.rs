//! Server-side S3 copies through the AWS SDK.
//!
//! [`S3Copier`] asks the source region for the object's size first. Objects
//! up to the 5 GiB `CopyObject` limit are copied with one request against
//! the target region; larger ones go through a multipart upload whose parts
//! are `UploadPartCopy` ranges of the source. A multipart copy that fails
//! part-way is aborted so no orphaned parts are left in the target bucket.
//!
//! Every SDK failure becomes a [`CopyError`]. Service errors keep their S3
//! error code, including the `200 OK` responses with an `<Error>` body that
//! S3 can send once a copy has started.

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use backup_core::{CopyError, CopyRequest, ObjectCopier};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, info, warn};

use crate::config::S3Config;

/// Largest object `CopyObject` accepts (5 GiB).
pub const MAX_SINGLE_COPY: u64 = 5_368_709_120;

/// Size of each `UploadPartCopy` range (512 MiB).
pub const PART_SIZE: u64 = 536_870_912;

/// Name the static credentials are reported under.
const CREDENTIALS_PROVIDER: &str = "backup-worker-env";

/// Characters escaped in `x-amz-copy-source`. Keeps `/` so keys stay
/// hierarchical.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Copies objects between buckets with the S3 API.
///
/// Holds one base SDK configuration and derives a client per region, so the
/// size lookup talks to the source region and the copy to the target
/// region.
pub struct S3Copier {
    base: aws_sdk_s3::Config,
    part_size: u64,
}

impl S3Copier {
    /// Create a copier from its configuration.
    ///
    /// A custom endpoint switches to path-style addressing.
    pub async fn new(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            config.credentials.access_key_id.clone(),
            config.credentials.secret_access_key.clone(),
            None,
            None,
            CREDENTIALS_PROVIDER,
        );
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;

        let base = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(config.endpoint.is_some())
            .build();
        Self::from_conf(base)
    }

    const fn from_conf(base: aws_sdk_s3::Config) -> Self {
        Self {
            base,
            part_size: PART_SIZE,
        }
    }

    fn client(&self, region: &str) -> Client {
        let config = self
            .base
            .to_builder()
            .region(Region::new(region.to_owned()))
            .build();
        Client::from_conf(config)
    }

    async fn copy_multipart(
        &self,
        target: &Client,
        request: &CopyRequest,
        size: u64,
    ) -> Result<(), CopyError> {
        let created = target
            .create_multipart_upload()
            .bucket(&request.target_bucket)
            .key(&request.object_key)
            .send()
            .await
            .map_err(|e| sdk_error("CreateMultipartUpload", &e))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| {
                CopyError::Protocol("CreateMultipartUpload returned no UploadId".to_owned())
            })?
            .to_owned();
        debug!(object_key = %request.object_key, upload_id = %upload_id, "multipart copy started");

        match self.copy_parts(target, request, &upload_id, size).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Err(abort_error) = abort(target, request, &upload_id).await {
                    warn!(
                        object_key = %request.object_key,
                        upload_id = %upload_id,
                        error = %abort_error,
                        "failed to abort multipart copy"
                    );
                }
                Err(e)
            }
        }
    }

    async fn copy_parts(
        &self,
        target: &Client,
        request: &CopyRequest,
        upload_id: &str,
        size: u64,
    ) -> Result<(), CopyError> {
        let source = copy_source(request);
        let mut parts = Vec::new();
        for (index, (first, last)) in part_ranges(size, self.part_size).into_iter().enumerate() {
            let part_number = index
                .checked_add(1)
                .and_then(|number| i32::try_from(number).ok())
                .ok_or_else(|| {
                    CopyError::Protocol(format!("{} needs too many parts", request.object_key))
                })?;
            let copied = target
                .upload_part_copy()
                .bucket(&request.target_bucket)
                .key(&request.object_key)
                .upload_id(upload_id)
                .part_number(part_number)
                .copy_source(&source)
                .copy_source_range(format!("bytes={first}-{last}"))
                .send()
                .await
                .map_err(|e| sdk_error("UploadPartCopy", &e))?;
            let e_tag = copied
                .copy_part_result()
                .and_then(|result| result.e_tag())
                .ok_or_else(|| CopyError::Protocol(format!("part {part_number} returned no ETag")))?;
            parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(e_tag)
                    .build(),
            );
        }

        target
            .complete_multipart_upload()
            .bucket(&request.target_bucket)
            .key(&request.object_key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_error("CompleteMultipartUpload", &e))?;
        Ok(())
    }
}

impl ObjectCopier for S3Copier {
    async fn copy(&self, request: &CopyRequest) -> Result<(), CopyError> {
        let source = self.client(&request.source_region);
        let target = self.client(&request.target_region);
        let size = source_size(&source, request).await?;

        if size <= MAX_SINGLE_COPY {
            copy_object(&target, request).await?;
        } else {
            info!(object_key = %request.object_key, size, "using multipart copy");
            self.copy_multipart(&target, request, size).await?;
        }
        debug!(object_key = %request.object_key, size, "copy finished");
        Ok(())
    }
}

impl std::fmt::Debug for S3Copier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Copier")
            .field("part_size", &self.part_size)
            .finish_non_exhaustive()
    }
}

/// Size of the source object in bytes.
async fn source_size(source: &Client, request: &CopyRequest) -> Result<u64, CopyError> {
    let head = source
        .head_object()
        .bucket(&request.source_bucket)
        .key(&request.object_key)
        .send()
        .await
        .map_err(|e| {
            if e.as_service_error().is_some_and(HeadObjectError::is_not_found) {
                CopyError::Rejected {
                    status: 404,
                    code: "NoSuchKey".to_owned(),
                    message: format!(
                        "{}/{} does not exist",
                        request.source_bucket, request.object_key
                    ),
                }
            } else {
                sdk_error("HeadObject", &e)
            }
        })?;

    let length = head.content_length().ok_or_else(|| {
        CopyError::Protocol(format!(
            "HeadObject {} returned no Content-Length",
            request.object_key
        ))
    })?;
    u64::try_from(length).map_err(|_negative| {
        CopyError::Protocol(format!(
            "HeadObject {} returned length {length}",
            request.object_key
        ))
    })
}

async fn copy_object(target: &Client, request: &CopyRequest) -> Result<(), CopyError> {
    target
        .copy_object()
        .bucket(&request.target_bucket)
        .key(&request.object_key)
        .copy_source(copy_source(request))
        .send()
        .await
        .map_err(|e| sdk_error("CopyObject", &e))?;
    Ok(())
}

async fn abort(target: &Client, request: &CopyRequest, upload_id: &str) -> Result<(), CopyError> {
    target
        .abort_multipart_upload()
        .bucket(&request.target_bucket)
        .key(&request.object_key)
        .upload_id(upload_id)
        .send()
        .await
        .map_err(|e| sdk_error("AbortMultipartUpload", &e))?;
    Ok(())
}

/// `bucket/key` with the key escaped, as `x-amz-copy-source` expects.
fn copy_source(request: &CopyRequest) -> String {
    format!(
        "{}/{}",
        request.source_bucket,
        utf8_percent_encode(&request.object_key, COPY_SOURCE)
    )
}

/// Service errors keep their status and S3 error code; everything else
/// (connection, timeout, response parsing) is a transport failure.
fn sdk_error<E>(operation: &str, error: &SdkError<E, HttpResponse>) -> CopyError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match error.as_service_error() {
        Some(service) => CopyError::Rejected {
            status: error.raw_response().map_or(0, |raw| raw.status().as_u16()),
            code: service.code().unwrap_or("Unknown").to_owned(),
            message: service
                .message()
                .map_or_else(|| format!("{operation} failed"), str::to_owned),
        },
        None => CopyError::Transport(format!(
            "{operation} failed: {}",
            DisplayErrorContext(error)
        )),
    }
}

/// Inclusive byte ranges covering `size` bytes in `part_size` chunks.
fn part_ranges(size: u64, part_size: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    let mut first = 0_u64;
    while first < size {
        let last = first.saturating_add(part_size).min(size).saturating_sub(1);
        ranges.push((first, last));
        first = last.saturating_add(1);
    }
    ranges
}
