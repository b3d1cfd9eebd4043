use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::load::Config;
use crate::shared::{BatchConfig, ValidationError};

/// Configuration of a copy worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Keyspace attached to every emitted event.
    pub keyspace: String,
    /// Shard attached to every emitted event.
    pub shard: String,
    /// Interval between two lag checks while catching up.
    #[serde(default = "default_catchup_retry_ms")]
    pub catchup_retry_ms: u64,
    /// Catch-up finishes once the estimated lag is at or below this many seconds.
    #[serde(default = "default_max_replication_lag_secs")]
    pub max_replication_lag_secs: u64,
    /// Snapshot batch bounds.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Emits a diagnostic marker event before every table copy.
    #[serde(default)]
    pub emit_copy_markers: bool,
}

impl CopyConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.keyspace.is_empty() {
            return Err(ValidationError::EmptyKeyspace);
        }

        if self.catchup_retry_ms == 0 {
            return Err(ValidationError::CatchupRetryZero);
        }

        self.batch.validate()
    }

    pub fn catchup_retry_interval(&self) -> Duration {
        Duration::from_millis(self.catchup_retry_ms)
    }

    pub fn max_replication_lag(&self) -> Duration {
        Duration::from_secs(self.max_replication_lag_secs)
    }
}

impl Config for CopyConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

fn default_catchup_retry_ms() -> u64 {
    5_000
}

fn default_max_replication_lag_secs() -> u64 {
    1
}
