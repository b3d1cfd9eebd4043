//! Fault injection points for testing how a copy recovers from failures.
//!
//! Failpoints are configured from tests through the `fail` crate.

use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};

pub const COPY_TABLE__AFTER_BATCH_SENT: &str = "copy_table.after_batch_sent";

/// Executes a configurable failpoint.
///
/// When the failpoint is configured to return, this function returns an
/// [`ErrorKind::FailpointTriggered`] error. Returns `Ok(())` when the failpoint is inactive.
pub fn etl_fail_point(name: &str) -> EtlResult<()> {
    fail_point!(name, |_| {
        bail!(
            ErrorKind::FailpointTriggered,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
