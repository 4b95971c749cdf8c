use redis::{aio::MultiplexedConnection, AsyncCommands, Client, RedisResult};
use tracing::debug;

/// Shared multiplexed connection used for pub/sub fan-out of seat changes.
#[derive(Clone)]
pub struct RedisClient {
    conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_tokio_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(RedisClient { conn })
    }

    /// Returns the number of subscribers that received the message.
    pub async fn publish(&self, channel: &str, payload: String) -> RedisResult<i64> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(channel, payload).await?;
        debug!("Published to {} ({} receivers)", channel, receivers);
        Ok(receivers)
    }
}
