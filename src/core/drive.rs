use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::core::config::StorageConfig;

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content_type: String,
    pub body: Bytes,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn get(&self, key: &str) -> anyhow::Result<Option<StoredObject>>;
    fn public_url(&self, key: &str) -> String;
}

pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    base_url: String,
}

impl MemoryObjectStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                content_type: content_type.to_string(),
                body,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<StoredObject>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/uploads/{}", self.base_url, key)
    }
}

#[cfg(feature = "drive")]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_url: String,
}

#[cfg(feature = "drive")]
impl S3ObjectStore {
    pub async fn connect(config: &StorageConfig, bucket: &str) -> Self {
        use aws_config::BehaviorVersion;
        use aws_sdk_s3::config::Builder as S3ConfigBuilder;

        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let base_config = loader.load().await;

        let s3_config = S3ConfigBuilder::from(&base_config)
            .force_path_style(config.endpoint.is_some())
            .build();

        let public_url = config
            .public_url
            .clone()
            .unwrap_or_else(|| format!("https://{bucket}.s3.amazonaws.com"));

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: bucket.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }
}

#[cfg(feature = "drive")]
#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        use aws_sdk_s3::primitives::ByteStream;

        log::info!("Uploading s3://{}/{}", self.bucket, key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to upload object: {}", e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<StoredObject>> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    return Ok(None);
                }
                return Err(anyhow::anyhow!("Failed to fetch object: {}", e));
            }
        };
        let content_type = output
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = output.body.collect().await?.into_bytes();
        Ok(Some(StoredObject { content_type, body }))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_url, key)
    }
}

pub async fn build_object_store(config: &StorageConfig, base_url: &str) -> Arc<dyn ObjectStore> {
    match config.bucket.as_deref() {
        #[cfg(feature = "drive")]
        Some(bucket) => Arc::new(S3ObjectStore::connect(config, bucket).await),
        #[cfg(not(feature = "drive"))]
        Some(bucket) => {
            log::warn!("Bucket {} configured but drive support is disabled", bucket);
            Arc::new(MemoryObjectStore::new(base_url))
        }
        None => Arc::new(MemoryObjectStore::new(base_url)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryObjectStore::new("http://localhost:8080/");
        store
            .put("ws/a.png", Bytes::from_static(b"png"), "image/png")
            .await
            .unwrap();
        let object = store.get("ws/a.png").await.unwrap().unwrap();
        assert_eq!(object.content_type, "image/png");
        assert_eq!(store.public_url("ws/a.png"), "http://localhost:8080/uploads/ws/a.png");
        assert!(store.get("missing").await.unwrap().is_none());
    }
}
