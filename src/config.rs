//! Collector configuration.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::codec::parse_signed;
use crate::scan::{DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE};

/// Environment variable holding the scan interval in microseconds.
pub const PERIOD_ENV: &str = "FIELDTAP_PERIOD";

pub const DEFAULT_INTERVAL_US: u64 = 100_000;

/// Assumed number of stored samples per field between drains.
pub const DEFAULT_LOG_CAPACITY: usize = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Pause between scan cycles, in microseconds.
    /// Default: 100000 (100 ms)
    pub interval_us: u64,

    /// Read chunk size used by the scanner. Values below 7 are raised to 7.
    /// Default: 4096
    pub chunk_size: usize,

    /// Initial sample capacity of each field's time series.
    /// Default: 5000
    pub log_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_us: DEFAULT_INTERVAL_US,
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl CollectorConfig {
    /// Defaults, with the interval taken from [`PERIOD_ENV`] when it holds a
    /// positive number.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = env::var(PERIOD_ENV) {
            match parse_period(&raw) {
                Some(interval_us) => config.interval_us = interval_us,
                None => log::warn!(
                    "{PERIOD_ENV}={raw:?} is not a positive interval, using {DEFAULT_INTERVAL_US}us"
                ),
            }
        }
        config
    }

    pub fn interval(&self) -> Duration {
        Duration::from_micros(self.interval_us.max(1))
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.max(MIN_CHUNK_SIZE)
    }
}

fn parse_period(raw: &str) -> Option<u64> {
    u64::try_from(parse_signed(raw, 10)).ok().filter(|&us| us > 0)
}
