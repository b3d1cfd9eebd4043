//! Configuration for the snapshot copy phase.
//!
//! Provides environment detection, layered configuration loading from YAML files and
//! environment variables, and the shared configuration types used by the copy worker.

mod environment;
mod load;
pub mod shared;

pub use environment::*;
pub use load::*;
