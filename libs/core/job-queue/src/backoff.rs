//! Retry delay policies applied between a job's failed attempts.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Delay function for retries.
///
/// After the k-th failed attempt (k starting at 1) the next attempt becomes
/// ready `base_delay_ms` later for [`BackoffKind::Fixed`] and
/// `base_delay_ms * 2^(k-1)` later for [`BackoffKind::Exponential`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(rename = "type")]
    pub kind: BackoffKind,
    pub base_delay_ms: u64,
}

impl BackoffPolicy {
    pub const fn fixed(base_delay_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Fixed,
            base_delay_ms,
        }
    }

    pub const fn exponential(base_delay_ms: u64) -> Self {
        Self {
            kind: BackoffKind::Exponential,
            base_delay_ms,
        }
    }

    /// Delay before the next attempt, given how many attempts have failed so far.
    pub fn delay_after_failure(&self, failed_attempts: u32) -> u64 {
        match self.kind {
            BackoffKind::Fixed => self.base_delay_ms,
            BackoffKind::Exponential => {
                let exponent = failed_attempts.saturating_sub(1);
                let factor = 2u64.checked_pow(exponent).unwrap_or(u64::MAX);
                self.base_delay_ms.saturating_mul(factor)
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential(2000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_schedule() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_after_failure(1), 2000);
        assert_eq!(policy.delay_after_failure(2), 4000);
        assert_eq!(policy.delay_after_failure(3), 8000);
    }

    #[test]
    fn test_fixed_schedule() {
        let policy = BackoffPolicy::fixed(500);
        assert_eq!(policy.delay_after_failure(1), 500);
        assert_eq!(policy.delay_after_failure(7), 500);
    }

    #[test]
    fn test_exponential_saturates() {
        let policy = BackoffPolicy::exponential(1000);
        assert_eq!(policy.delay_after_failure(200), u64::MAX);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_value(BackoffPolicy::exponential(2000)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "exponential", "base_delay_ms": 2000}));
    }
}
