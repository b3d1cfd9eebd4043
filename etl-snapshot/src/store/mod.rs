//! Persistence of copy checkpoints across restarts.
//!
//! A checkpoint records, per table, the key of the last row whose event group was delivered and
//! whether the table is fully copied, together with the log position of the copy.

pub mod checkpoint;
