//! Throwaway Redis server for queue store tests.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;

const REDIS_TAG: &str = "8-alpine";

/// A Redis container that lives as long as this value.
///
/// Each test should use its own queue name (see [`crate::TestDataBuilder`])
/// so keys never collide when tests share a server.
pub struct TestRedis {
    _container: ContainerAsync<Redis>,
    url: String,
}

impl TestRedis {
    pub async fn new() -> Self {
        let container = Redis::default()
            .with_tag(REDIS_TAG)
            .start()
            .await
            .expect("Failed to start Redis container");

        let port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");
        let url = format!("redis://127.0.0.1:{}", port);

        tracing::info!(port, tag = REDIS_TAG, "Test Redis ready");
        Self {
            _container: container,
            url,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// A `ConnectionManager`, the connection type `RedisQueueStore` takes.
    pub async fn connection_manager(&self) -> ConnectionManager {
        let client = Client::open(self.url.as_str()).expect("Invalid test Redis URL");
        ConnectionManager::new(client)
            .await
            .expect("Failed to connect to test Redis")
    }

    /// Keys under `prefix`, sorted. Handy for checking what a queue left behind.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut conn = self.connection_manager().await;
        let mut keys: Vec<String> = conn
            .keys(format!("{}*", prefix))
            .await
            .expect("KEYS failed");
        keys.sort();
        keys
    }
}
