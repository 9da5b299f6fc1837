//! Prometheus metrics for queues and workers

use crate::job::QueueCounts;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder.
///
/// Call this once at startup. Subsequent calls are no-ops.
pub fn init_metrics() -> Result<(), BuildError> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics initialized");
        Ok::<_, BuildError>(handle)
    })?;
    Ok(())
}

/// Get the Prometheus handle for rendering metrics
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus text format (empty if not initialized)
pub fn render_metrics() -> String {
    prometheus_handle().map(|h| h.render()).unwrap_or_default()
}

/// Per-queue metrics helper
#[derive(Clone, Debug)]
pub struct QueueMetrics {
    queue: String,
}

impl QueueMetrics {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
        }
    }

    pub fn job_enqueued(&self, kind: &str) {
        counter!(
            "notification_queue_jobs_enqueued_total",
            "queue" => self.queue.clone(),
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    pub fn job_completed(&self, kind: &str, duration: Duration) {
        counter!(
            "notification_queue_jobs_processed_total",
            "queue" => self.queue.clone(),
            "kind" => kind.to_string(),
            "status" => "completed"
        )
        .increment(1);

        histogram!(
            "notification_queue_job_duration_seconds",
            "queue" => self.queue.clone(),
            "kind" => kind.to_string()
        )
        .record(duration.as_secs_f64());
    }

    pub fn job_failed(&self, kind: &str, category: &str) {
        counter!(
            "notification_queue_jobs_processed_total",
            "queue" => self.queue.clone(),
            "kind" => kind.to_string(),
            "status" => "failed"
        )
        .increment(1);

        counter!(
            "notification_queue_job_errors_total",
            "queue" => self.queue.clone(),
            "category" => category.to_string()
        )
        .increment(1);
    }

    pub fn job_retried(&self, kind: &str) {
        counter!(
            "notification_queue_jobs_retried_total",
            "queue" => self.queue.clone(),
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    pub fn job_stalled(&self, kind: &str) {
        counter!(
            "notification_queue_jobs_stalled_total",
            "queue" => self.queue.clone(),
            "kind" => kind.to_string()
        )
        .increment(1);
    }

    pub fn jobs_drained(&self, count: u64) {
        counter!("notification_queue_jobs_drained_total", "queue" => self.queue.clone())
            .increment(count);
    }

    pub fn failed_jobs_revived(&self, count: u64) {
        counter!("notification_queue_jobs_revived_total", "queue" => self.queue.clone())
            .increment(count);
    }

    /// Publish a status snapshot as gauges
    pub fn record_counts(&self, counts: &QueueCounts) {
        for (status, value) in [
            ("waiting", counts.waiting),
            ("delayed", counts.delayed),
            ("active", counts.active),
            ("completed", counts.completed),
            ("failed", counts.failed),
        ] {
            gauge!(
                "notification_queue_jobs",
                "queue" => self.queue.clone(),
                "status" => status
            )
            .set(value as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = QueueMetrics::new("notifications");
        assert_eq!(metrics.queue, "notifications");
        // No recorder installed: calls are no-ops
        metrics.job_enqueued("send-email");
        metrics.record_counts(&QueueCounts::default());
    }

    #[test]
    fn test_render_without_init_is_empty() {
        if prometheus_handle().is_none() {
            assert!(render_metrics().is_empty());
        }
    }
}
