use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::redis_client::RedisClient;

pub const CREDENTIAL_KEY: &str = "assistant:credential";

/// Where the job service API key lives between requests.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self) -> Result<Option<String>>;
    async fn save(&self, credential: &str) -> Result<()>;
}

/// Interactive source of a replacement credential. `None` means declined.
#[async_trait]
pub trait CredentialPrompt: Send + Sync {
    async fn request_credential(&self, reason: &str) -> Option<String>;
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    credential: RwLock<Option<String>>,
}

impl MemoryCredentialStore {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            credential: RwLock::new(initial),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self) -> Result<Option<String>> {
        Ok(self.credential.read().await.clone())
    }

    async fn save(&self, credential: &str) -> Result<()> {
        *self.credential.write().await = Some(credential.to_string());
        Ok(())
    }
}

pub struct RedisCredentialStore {
    redis: RedisClient,
}

impl RedisCredentialStore {
    /// Seeds the key with `initial` when Redis does not hold a credential yet.
    pub async fn new(redis: RedisClient, initial: Option<String>) -> Result<Self> {
        let store = Self { redis };
        if let Some(initial) = initial {
            if store.get().await?.is_none() {
                store.save(&initial).await?;
            }
        }
        Ok(store)
    }
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn get(&self) -> Result<Option<String>> {
        let mut redis = self.redis.clone();
        redis.get_string(CREDENTIAL_KEY).await
    }

    async fn save(&self, credential: &str) -> Result<()> {
        let mut redis = self.redis.clone();
        redis.set_string(CREDENTIAL_KEY, credential).await
    }
}
