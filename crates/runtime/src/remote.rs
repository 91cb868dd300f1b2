//! Remote object storage client.
//!
//! [`RemoteStore`] is the seam between the analytics core and S3. The default
//! [`ObjectStoreRemote`] runs over any `object_store` backend; presigning is
//! only available when a [`Signer`] is supplied (the S3 client is both).

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use ghgp_common::config::StorageSettings;
use ghgp_error::{GhgpError, Result};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{ClientOptions, ObjectStore};
use tokio::io::AsyncWriteExt;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Listing entry for a remote object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[async_trait]
pub trait RemoteStore: Send + Sync + fmt::Debug {
    /// Download `key` into `dest`, creating or truncating it.
    async fn fetch_to(&self, key: &str, dest: &Path) -> Result<()>;

    /// Every object under `prefix`, across all listing pages.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Object metadata, or `None` when the key does not exist.
    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>>;

    /// Time-limited GET URL for `key`.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String>;
}

pub struct ObjectStoreRemote {
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
}

impl fmt::Debug for ObjectStoreRemote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreRemote")
            .field("store", &self.store.to_string())
            .field("presign", &self.signer.is_some())
            .finish()
    }
}

impl ObjectStoreRemote {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            signer: None,
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// S3 client for the configured bucket. Credentials come from the usual
    /// `AWS_*` environment variables.
    pub fn s3(settings: &StorageSettings) -> Result<Self> {
        let client_options = ClientOptions::new()
            .with_connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .with_timeout(Duration::from_secs(settings.fetch_timeout_secs));

        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&settings.bucket)
            .with_region(&settings.region)
            .with_allow_http(settings.allow_http)
            .with_client_options(client_options);

        if let Some(endpoint) = &settings.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        let s3 = Arc::new(
            builder
                .build()
                .map_err(|e| GhgpError::remote_store(&settings.bucket, e))?,
        );

        Ok(Self::new(s3.clone()).with_signer(s3))
    }
}

fn object_info(meta: object_store::ObjectMeta) -> ObjectInfo {
    ObjectInfo {
        key: meta.location.to_string(),
        size: meta.size,
        last_modified: meta.last_modified,
    }
}

#[async_trait]
impl RemoteStore for ObjectStoreRemote {
    async fn fetch_to(&self, key: &str, dest: &Path) -> Result<()> {
        let location = ObjectPath::from(key);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| GhgpError::remote_store(key, e))?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = result.into_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| GhgpError::remote_store(key, e))?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let location = ObjectPath::from(prefix);
        let mut stream = self.store.list(Some(&location));
        let mut objects = Vec::new();

        while let Some(meta) = stream.next().await {
            let meta = meta.map_err(|e| GhgpError::remote_store(prefix, e))?;
            objects.push(object_info(meta));
        }

        Ok(objects)
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>> {
        match self.store.head(&ObjectPath::from(key)).await {
            Ok(meta) => Ok(Some(object_info(meta))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(GhgpError::remote_store(key, e)),
        }
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> Result<String> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| GhgpError::remote_store(key, "Presigned URLs are not supported"))?;

        let url = signer
            .signed_url(http::Method::GET, &ObjectPath::from(key), expires_in)
            .await
            .map_err(|e| GhgpError::remote_store(key, e))?;

        Ok(url.to_string())
    }
}
