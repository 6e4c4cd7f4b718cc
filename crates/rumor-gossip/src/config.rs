//! Tuning knobs for the gossip loop and failure detector.

use std::time::Duration;

use crate::detector::{DEFAULT_MIN_STD_DEV_MS, DEFAULT_PHI_THRESHOLD, DEFAULT_WINDOW};
use crate::error::GossipError;

/// Failure detector tuning shared by every tracked peer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Phi level at which a peer is declared failed.
    pub threshold: f64,
    /// Heartbeat intervals retained per peer.
    pub window: usize,
    /// Floor on the fitted standard deviation, in milliseconds.
    pub min_std_dev_ms: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_PHI_THRESHOLD,
            window: DEFAULT_WINDOW,
            min_std_dev_ms: DEFAULT_MIN_STD_DEV_MS,
        }
    }
}

/// Protocol configuration.
///
/// The defaults suit a small LAN cluster; tests shrink the interval to
/// keep wall-clock time down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GossipConfig {
    /// Delay between gossip rounds.
    pub interval: Duration,
    /// Peers contacted per round.
    pub fanout: usize,
    /// Failure detector tuning.
    pub detector: DetectorConfig,
    /// Capacity of the peer event broadcast channel.
    pub event_capacity: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            fanout: 3,
            detector: DetectorConfig::default(),
            event_capacity: 64,
        }
    }
}

impl GossipConfig {
    /// Rejects configurations the loop cannot run with.
    ///
    /// # Errors
    ///
    /// [`GossipError::Config`] naming the offending parameter.
    pub fn validate(&self) -> Result<(), GossipError> {
        if self.interval.is_zero() {
            return Err(GossipError::Config {
                reason: "gossip interval must be non-zero".to_owned(),
            });
        }
        if self.fanout == 0 {
            return Err(GossipError::Config {
                reason: "fanout must be at least 1".to_owned(),
            });
        }
        if self.detector.threshold <= 0.0 {
            return Err(GossipError::Config {
                reason: "phi threshold must be positive".to_owned(),
            });
        }
        if self.detector.window < 2 {
            return Err(GossipError::Config {
                reason: "detector window must hold at least 2 samples".to_owned(),
            });
        }
        if self.event_capacity == 0 {
            return Err(GossipError::Config {
                reason: "event capacity must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(GossipConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_fanout_is_rejected() {
        let config = GossipConfig {
            fanout: 0,
            ..GossipConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fanout"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = GossipConfig {
            interval: Duration::ZERO,
            ..GossipConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn degenerate_detector_is_rejected() {
        let config = GossipConfig {
            detector: DetectorConfig {
                window: 1,
                ..DetectorConfig::default()
            },
            ..GossipConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
