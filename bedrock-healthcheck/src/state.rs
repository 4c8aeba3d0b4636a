use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use crate::probes::ProbeResult;

const STATUS_BITS: u32 = 2;
const STATUS_MASK: u64 = (1 << STATUS_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HealthStatus {
    Unchecked = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl HealthStatus {
    fn from_bits(value: u64) -> Self {
        match value & STATUS_MASK {
            1 => Self::Healthy,
            2 => Self::Unhealthy,
            _ => Self::Unchecked,
        }
    }

    pub fn healthy_value(self) -> u64 {
        (self == Self::Healthy) as u64
    }

    pub fn unhealthy_value(self) -> u64 {
        (self == Self::Unhealthy) as u64
    }
}

/// Latest probe outcome, written by the probe loop and read by scrapes.
///
/// Status and check time share one word (`millis << 2 | status`), so a
/// reader sees either the previous result or the new one, never a mix.
#[derive(Debug, Default)]
pub struct HealthState {
    packed: AtomicU64,
}

impl HealthState {
    pub fn record(&self, result: &ProbeResult) {
        let status = if result.reachable {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        let millis = result.timestamp.timestamp_millis().max(0) as u64;
        self.packed
            .store((millis << STATUS_BITS) | status as u64, Ordering::Release);
    }

    /// Status and check time from the same write.
    pub fn snapshot(&self) -> (HealthStatus, Option<DateTime<Utc>>) {
        let packed = self.packed.load(Ordering::Acquire);
        match HealthStatus::from_bits(packed) {
            HealthStatus::Unchecked => (HealthStatus::Unchecked, None),
            status => (
                status,
                DateTime::from_timestamp_millis((packed >> STATUS_BITS) as i64),
            ),
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.snapshot().0
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.snapshot().1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::Target;

    fn result(reachable: bool) -> ProbeResult {
        ProbeResult {
            target: Target::new("127.0.0.1", 19132),
            reachable,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_unchecked_exports_zero_for_both() {
        let state = HealthState::default();
        assert_eq!(state.status(), HealthStatus::Unchecked);
        assert_eq!(state.status().healthy_value(), 0);
        assert_eq!(state.status().unhealthy_value(), 0);
        assert!(state.last_check().is_none());
    }

    #[test]
    fn test_latest_result_wins() {
        let state = HealthState::default();

        state.record(&result(true));
        assert_eq!(state.status(), HealthStatus::Healthy);
        assert_eq!(state.status().healthy_value(), 1);
        assert_eq!(state.status().unhealthy_value(), 0);

        let failed = result(false);
        state.record(&failed);
        assert_eq!(state.status(), HealthStatus::Unhealthy);
        assert_eq!(state.status().healthy_value(), 0);
        assert_eq!(state.status().unhealthy_value(), 1);
        assert_eq!(
            state.last_check().map(|t| t.timestamp_millis()),
            Some(failed.timestamp.timestamp_millis())
        );
    }

    #[test]
    fn test_snapshot_pairs_status_with_its_own_timestamp() {
        let state = HealthState::default();

        let earlier = ProbeResult {
            timestamp: DateTime::from_timestamp_millis(1_700_000_000_123).unwrap(),
            ..result(true)
        };
        let later = ProbeResult {
            timestamp: DateTime::from_timestamp_millis(1_700_000_001_456).unwrap(),
            ..result(false)
        };

        state.record(&earlier);
        let (status, at) = state.snapshot();
        assert_eq!(status, HealthStatus::Healthy);
        assert_eq!(at.map(|t| t.timestamp_millis()), Some(1_700_000_000_123));

        state.record(&later);
        let (status, at) = state.snapshot();
        assert_eq!(status, HealthStatus::Unhealthy);
        assert_eq!(at.map(|t| t.timestamp_millis()), Some(1_700_000_001_456));
    }
}
