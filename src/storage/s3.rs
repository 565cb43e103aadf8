use bytes::Bytes;
use object_store::{ObjectStore, aws::AmazonS3Builder, path::Path};
use std::sync::Arc;

use crate::config::S3Config;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct S3Storage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    endpoint: Option<String>,
}

impl S3Storage {
    pub fn new(config: &S3Config) -> AppResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_virtual_hosted_style_request(false)
            .with_allow_http(true);

        if let Some(ref endpoint) = config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        if let Some(ref region) = config.region {
            builder = builder.with_region(region);
        }

        if let Some(ref access_key_id) = config.access_key_id {
            builder = builder.with_access_key_id(access_key_id);
        }

        if let Some(ref secret_access_key) = config.secret_access_key {
            builder = builder.with_secret_access_key(secret_access_key);
        }

        let store = builder
            .build()
            .map_err(|e| AppError::Storage(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket.clone(),
            endpoint: config.endpoint.clone(),
        })
    }

    /// Idempotently ensure the configured bucket exists. `object_store`'s
    /// S3 client has no bucket-creation call, so this probes with a
    /// listing first and, only when the bucket is genuinely absent AND a
    /// MinIO-compatible endpoint is configured, issues a raw path-style
    /// `PUT /{bucket}` to create it. Pure-AWS deployments (no explicit
    /// endpoint) skip creation, since bucket provisioning there is an
    /// account/region-level operation outside this adapter's scope, and
    /// a missing bucket is surfaced as a startup error instead.
    pub async fn ensure_bucket(&self) -> AppResult<()> {
        let path = Path::from("");
        use futures::StreamExt;
        let mut stream = self.store.list(Some(&path));
        match stream.next().await {
            Some(Err(object_store::Error::NotFound { .. })) => self.create_bucket().await,
            Some(Err(e)) => Err(AppError::Storage(format!(
                "bucket '{}' probe failed: {}",
                self.bucket, e
            ))),
            _ => Ok(()),
        }
    }

    async fn create_bucket(&self) -> AppResult<()> {
        let Some(ref endpoint) = self.endpoint else {
            return Err(AppError::Storage(format!(
                "bucket '{}' does not exist and no MinIO-compatible endpoint is configured to create it",
                self.bucket
            )));
        };

        let url = format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket);
        let response = reqwest::Client::new()
            .put(&url)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("failed to create bucket '{}': {}", self.bucket, e)))?;

        if response.status().is_success() || response.status() == reqwest::StatusCode::CONFLICT {
            Ok(())
        } else {
            Err(AppError::Storage(format!(
                "failed to create bucket '{}': server returned {}",
                self.bucket,
                response.status()
            )))
        }
    }

    /// Get an object from S3
    pub async fn get(&self, key: &str) -> AppResult<Bytes> {
        let path = Path::from(key);
        let result = self
            .store
            .get(&path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to get object: {}", e)))?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to read object: {}", e)))?;

        Ok(bytes)
    }

    /// Put an object to S3
    pub async fn put(&self, key: &str, data: Bytes) -> AppResult<()> {
        let path = Path::from(key);
        self.store
            .put(&path, data.into())
            .await
            .map_err(|e| AppError::Storage(format!("Failed to put object: {}", e)))?;

        Ok(())
    }

    /// Get the S3 URI for an object
    fn s3_uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    /// HTTP(S) URL a client can fetch the object from directly, used to
    /// populate `image_url`/`cog_url` in layer records. Falls back to the
    /// `s3://` form when no endpoint is configured (pure AWS deployments
    /// behind a CDN/signer the caller supplies separately).
    pub fn public_url(&self, key: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key),
            None => self.s3_uri(key),
        }
    }
}

/// Canonical object key for an artifact belonging to a layer
/// (`layers/{layer_id}/{file}`).
pub fn layer_key(layer_id: &str, file: &str) -> String {
    format!("layers/{}/{}", layer_id, file)
}

#[cfg(test)]
mod tests {
    use super::layer_key;

    #[test]
    fn layer_key_follows_canonical_layout() {
        assert_eq!(layer_key("abc123", "layer.tif"), "layers/abc123/layer.tif");
    }
}
