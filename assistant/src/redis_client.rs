use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use anyhow::Result;

#[derive(Clone)]
pub struct RedisClient {
    connection: ConnectionManager,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = client.get_tokio_connection_manager().await?;
        Ok(Self { connection })
    }

    pub async fn get_string(&mut self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self.connection.get(key).await?;
        Ok(value)
    }

    pub async fn set_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.connection.set::<_, _, ()>(key, value).await?;
        Ok(())
    }
}
