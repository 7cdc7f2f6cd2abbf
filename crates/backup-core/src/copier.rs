//! The copy primitive.
//!
//! A copy takes one object key from the source bucket to the same key in the
//! target bucket. Implementations perform the copy server-side and either
//! succeed completely or fail with a [`CopyError`]; no partial state is
//! exposed. Credentials belong to the implementation, not to the request.

use std::collections::BTreeSet;
use std::sync::Mutex;

/// Why a copy failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CopyError {
    /// The request never produced a service response (connection, timeout,
    /// unreadable response).
    #[error("copy transport error: {0}")]
    Transport(String),

    /// The storage service answered with an error.
    #[error("copy rejected with status {status}: {code}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Service error code (for example `NoSuchKey` or `AccessDenied`).
        code: String,
        /// Service error message or response excerpt.
        message: String,
    },

    /// The service answered with something the copier did not expect.
    #[error("copy protocol error: {0}")]
    Protocol(String),
}

/// Where copies go from and to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRoute {
    /// Bucket the object is copied from.
    pub source_bucket: String,
    /// Region of the source bucket.
    pub source_region: String,
    /// Bucket the object is copied to.
    pub target_bucket: String,
    /// Region of the target bucket.
    pub target_region: String,
}

impl CopyRoute {
    /// The same route with a different source region.
    #[must_use]
    pub fn with_source_region(&self, source_region: &str) -> Self {
        Self {
            source_region: source_region.to_owned(),
            ..self.clone()
        }
    }

    /// A request to copy `object_key` along this route.
    pub fn request(&self, object_key: &str) -> CopyRequest {
        CopyRequest {
            source_bucket: self.source_bucket.clone(),
            source_region: self.source_region.clone(),
            target_bucket: self.target_bucket.clone(),
            target_region: self.target_region.clone(),
            object_key: object_key.to_owned(),
        }
    }
}

/// One object to copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Bucket the object is copied from.
    pub source_bucket: String,
    /// Region of the source bucket.
    pub source_region: String,
    /// Bucket the object is copied to.
    pub target_bucket: String,
    /// Region of the target bucket.
    pub target_region: String,
    /// Key of the object in both buckets.
    pub object_key: String,
}

/// Performs server-side object copies.
#[allow(async_fn_in_trait)]
pub trait ObjectCopier {
    /// Copy one object. Runs to completion; there is no timeout or
    /// cancellation once the call is issued.
    ///
    /// # Errors
    ///
    /// Returns [`CopyError`] on any transport, auth, or not-found failure.
    async fn copy(&self, request: &CopyRequest) -> Result<(), CopyError>;
}

/// A copier that records requests instead of copying.
///
/// Keys registered with [`StubCopier::failing_on`] fail with a
/// `NoSuchKey` rejection; everything else succeeds.
#[derive(Debug, Default)]
pub struct StubCopier {
    copied: Mutex<Vec<CopyRequest>>,
    failing: BTreeSet<String>,
}

impl StubCopier {
    /// A copier where every copy succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make copies of `object_key` fail.
    #[must_use]
    pub fn failing_on(mut self, object_key: &str) -> Self {
        self.failing.insert(object_key.to_owned());
        self
    }

    /// Every successful request so far, in order.
    pub fn copied(&self) -> Vec<CopyRequest> {
        self.copied
            .lock()
            .map_or_else(|_| Vec::new(), |copied| copied.clone())
    }

    /// Keys of every successful request so far, in order.
    pub fn copied_keys(&self) -> Vec<String> {
        self.copied()
            .into_iter()
            .map(|request| request.object_key)
            .collect()
    }
}

impl ObjectCopier for StubCopier {
    async fn copy(&self, request: &CopyRequest) -> Result<(), CopyError> {
        if self.failing.contains(&request.object_key) {
            return Err(CopyError::Rejected {
                status: 404,
                code: "NoSuchKey".to_owned(),
                message: format!("stub refuses {}", request.object_key),
            });
        }
        let mut copied = self
            .copied
            .lock()
            .map_err(|e| CopyError::Transport(format!("stub copier lock poisoned: {e}")))?;
        copied.push(request.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn route() -> CopyRoute {
        CopyRoute {
            source_bucket: "content".to_owned(),
            source_region: "us-east-2".to_owned(),
            target_bucket: "content-backup".to_owned(),
            target_region: "us-west-2".to_owned(),
        }
    }

    #[test]
    fn request_carries_route_and_key() {
        let request = route().request("a/b.txt");
        assert_eq!(request.source_bucket, "content");
        assert_eq!(request.target_region, "us-west-2");
        assert_eq!(request.object_key, "a/b.txt");
    }

    #[test]
    fn source_region_override_keeps_target() {
        let moved = route().with_source_region("eu-west-1");
        assert_eq!(moved.source_region, "eu-west-1");
        assert_eq!(moved.target_bucket, "content-backup");
    }

    #[tokio::test]
    async fn stub_records_successes_and_refuses_failing_keys() {
        let copier = StubCopier::new().failing_on("bad");
        copier.copy(&route().request("good")).await.unwrap();
        let err = copier.copy(&route().request("bad")).await.unwrap_err();
        assert!(matches!(err, CopyError::Rejected { status: 404, .. }));
        assert_eq!(copier.copied_keys(), vec!["good".to_owned()]);
    }
}
