use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;

use super::{PresignError, Presigner};
use crate::config::StorageConfig;

/// Longest expiry a SigV4 presigned URL may carry.
const MAX_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

/// Presigns GET URLs against an S3-compatible store (MinIO in deployment),
/// addressing the bucket path-style: `{endpoint}/{bucket}/{key}?X-Amz-...`.
pub struct S3Presigner {
    bucket: Option<Box<Bucket>>,
    expiry_secs: u32,
}

impl S3Presigner {
    /// Without an endpoint and both keys every presign fails with
    /// [`PresignError::NotConfigured`], so callers send raw paths.
    pub fn new(config: &StorageConfig) -> Result<Self, PresignError> {
        let expiry_secs = config.presign_ttl.as_secs().clamp(1, MAX_EXPIRY_SECS) as u32;

        let (Some(endpoint), Some(access_key), Some(secret_key)) =
            (&config.endpoint, &config.access_key, &config.secret_key)
        else {
            return Ok(Self {
                bucket: None,
                expiry_secs,
            });
        };

        let credentials = Credentials::new(
            Some(access_key.as_str()),
            Some(secret_key.as_str()),
            None,
            None,
            None,
        )
        .map_err(|e| PresignError::Config(e.to_string()))?;
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: endpoint.clone(),
        };
        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| PresignError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self {
            bucket: Some(bucket),
            expiry_secs,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.bucket.is_some()
    }
}

#[async_trait]
impl Presigner for S3Presigner {
    async fn presign(&self, path: &str) -> Result<String, PresignError> {
        let object = path.trim().trim_start_matches('/');
        if object.is_empty() {
            return Err(PresignError::EmptyPath);
        }
        if object.starts_with("http://") || object.starts_with("https://") {
            return Ok(object.to_string());
        }

        let bucket = self.bucket.as_ref().ok_or(PresignError::NotConfigured)?;
        bucket
            .presign_get(format!("/{object}"), self.expiry_secs, None)
            .await
            .map_err(|e| PresignError::Signing(e.to_string()))
    }
}
