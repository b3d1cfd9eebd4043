//! Sources the copy reads from: the change log and the table snapshots.

mod change_log;
pub mod memory;
mod snapshot;

pub use change_log::*;
pub use snapshot::*;
