//! Shared test utilities
//!
//! This crate provides reusable container-backed test infrastructure:
//! - `TestDatabase`: PostgreSQL container with the workspace migrations applied (feature: "postgres")
//! - `TestRedis`: Redis container with automatic cleanup (feature: "redis")
//! - `TestDataBuilder`: Deterministic, per-test unique names (always available)
//!
//! # Features
//!
//! - `postgres` (default): Enables PostgreSQL test infrastructure
//! - `redis`: Enables Redis test infrastructure
//! - `all`: Enables both
//!
//! Tests that start containers are marked `#[ignore]` across the workspace;
//! run them with `cargo test -- --ignored` where Docker is available.
//!
//! ```rust,ignore
//! use test_utils::TestRedis;
//!
//! #[tokio::test]
//! #[ignore] // Requires actual Redis
//! async fn my_redis_test() {
//!     let redis = TestRedis::new().await;
//!     let manager = redis.connection_manager().await;
//!     // hand `manager` to the code under test
//! }
//! ```

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

#[cfg(feature = "redis")]
pub use redis::TestRedis;

/// Per-test unique names for queues and templates.
///
/// Names derive from a seed (usually the test name), so parallel tests that
/// share one container stay out of each other's keys and rows.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn from_test_name(name: &str) -> Self {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// `test-{prefix}-{seed}-{suffix}`
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }

    /// Redis key namespace for a queue store.
    pub fn queue_name(&self, label: &str) -> String {
        self.name("queue", label)
    }

    /// Row key for the `email_templates` table.
    pub fn template_name(&self, label: &str) -> String {
        self.name("template", label)
    }
}
