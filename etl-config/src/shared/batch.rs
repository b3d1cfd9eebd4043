use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Bounds for a single snapshot batch.
///
/// A batch is closed as soon as either limit is reached, so a batch never holds more than
/// `max_rows` rows and only exceeds `max_bytes` by its last row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of rows in a batch.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    /// Approximate maximum encoded size of a batch in bytes.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_rows == 0 {
            return Err(ValidationError::BatchMaxRowsZero);
        }

        if self.max_bytes == 0 {
            return Err(ValidationError::BatchMaxBytesZero);
        }

        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_max_rows() -> usize {
    10_000
}

fn default_max_bytes() -> usize {
    250 * 1024
}
