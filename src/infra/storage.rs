use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_s3::Client;
use futures::future::join_all;

use crate::config::S3Config;

#[derive(Clone)]
pub struct ObjectStorage {
    client: Client,
    bucket: String,
}

impl ObjectStorage {
    pub async fn new(config: &S3Config) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Region::new(config.region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut s3_builder = aws_sdk_s3::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .endpoint_url(config.endpoint.clone())
            .force_path_style(true);
        if let Some(provider) = shared_config.credentials_provider() {
            s3_builder = s3_builder.credentials_provider(provider);
        }

        Ok(Self {
            client: Client::from_conf(s3_builder.build()),
            bucket: config.bucket.clone(),
        })
    }

    /// `Ok(false)` when the object does not exist; other failures are errors.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if err.as_service_error().map_or(false, |e| e.is_not_found()) {
                    Ok(false)
                } else {
                    Err(anyhow!(err))
                }
            }
        }
    }
}

/// Confirms that submitted media references point at stored uploads.
#[async_trait]
pub trait MediaVerifier: Send + Sync {
    /// Returns the references that do not resolve. An `Err` means the
    /// backing storage could not be asked.
    async fn missing(&self, refs: &[String]) -> Result<Vec<String>>;
}

/// Strips the public base URL, leaving the object key.
fn object_key<'a>(base_url: &str, media_ref: &'a str) -> Option<&'a str> {
    media_ref
        .strip_prefix(base_url)
        .map(|key| key.trim_start_matches('/'))
        .filter(|key| !key.is_empty())
}

pub struct ObjectStorageVerifier {
    storage: ObjectStorage,
    base_url: String,
}

impl ObjectStorageVerifier {
    pub fn new(storage: ObjectStorage, base_url: impl Into<String>) -> Self {
        Self {
            storage,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MediaVerifier for ObjectStorageVerifier {
    async fn missing(&self, refs: &[String]) -> Result<Vec<String>> {
        let checks = refs.iter().map(|media_ref| async move {
            match object_key(&self.base_url, media_ref) {
                Some(key) => self.storage.exists(key).await.map(|found| (media_ref, found)),
                None => Ok((media_ref, false)),
            }
        });

        let mut missing = Vec::new();
        for result in join_all(checks).await {
            let (media_ref, found) = result?;
            if !found {
                missing.push(media_ref.clone());
            }
        }
        Ok(missing)
    }
}

/// Used when no object storage is configured: any reference under the
/// media base URL is accepted.
pub struct PrefixMediaVerifier {
    base_url: String,
}

impl PrefixMediaVerifier {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MediaVerifier for PrefixMediaVerifier {
    async fn missing(&self, refs: &[String]) -> Result<Vec<String>> {
        Ok(refs
            .iter()
            .filter(|media_ref| object_key(&self.base_url, media_ref).is_none())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prefix_verifier_accepts_only_base_url_objects() {
        let verifier = PrefixMediaVerifier::new("https://media.vigia.local/");
        let refs = vec![
            "https://media.vigia.local/uploads/a.jpg".to_string(),
            "https://elsewhere.example/a.jpg".to_string(),
            "https://media.vigia.local/".to_string(),
        ];
        let missing = verifier.missing(&refs).await.unwrap();
        assert_eq!(
            missing,
            vec![
                "https://elsewhere.example/a.jpg".to_string(),
                "https://media.vigia.local/".to_string(),
            ]
        );
    }

    #[test]
    fn object_key_strips_base_and_slashes() {
        assert_eq!(
            object_key("https://m.local", "https://m.local/uploads/x.png"),
            Some("uploads/x.png")
        );
        assert_eq!(object_key("https://m.local/", "https://other/x.png"), None);
    }
}
