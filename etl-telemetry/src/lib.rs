//! Tracing setup shared by binaries and tests of the copy workspace.

mod logging;

pub use logging::*;
