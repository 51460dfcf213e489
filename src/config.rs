//! Network and retention knobs (§6). Owned and deserialized by the (out of
//! scope) CLI/config-file layer; the core only reads a `CoreConfig`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Per-response hard cap, in megabytes.
    pub max_feed_size_mb: f64,
    /// Interval gate granularity in days; 0 means "always fetch".
    pub fetch_interval_days: u32,
    /// Logical day rollover hour, 0-23.
    pub day_start_hour: u8,
    /// History and seen-store retention horizon, in days.
    pub retention_days: u32,
    /// Max items kept per feed per read; 0 = unlimited.
    pub max_items_per_feed: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_feed_size_mb: 0.2,
            fetch_interval_days: 1,
            day_start_hour: 0,
            retention_days: 50,
            max_items_per_feed: 20,
        }
    }
}

impl CoreConfig {
    pub fn max_feed_size_bytes(&self) -> usize {
        (self.max_feed_size_mb * 1024.0 * 1024.0).round().max(0.0) as usize
    }
}
