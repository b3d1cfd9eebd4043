//! Resumable snapshot copy for a change data capture stream.
//!
//! A copy worker hands a new consumer a checkpointed base snapshot of every table in its plan
//! and stitches it to the live change log: before each table it catches up on the log until lag
//! is small, and on the first snapshot batch it replays ("fast-forwards") the log up to the exact
//! position the snapshot was read at. Every batch is emitted as one transaction ending with the
//! checkpoint key it can be resumed after.

pub mod concurrency;
pub mod destination;
pub mod error;
#[cfg(feature = "failpoints")]
pub mod failpoints;
mod macros;
pub mod metrics;
pub mod replication;
pub mod source;
pub mod state;
pub mod store;
#[cfg(test)]
mod test_utils;
pub mod types;
pub mod workers;
