//! The copy phase: catch-up, fast-forward and snapshot copy of every table in the copy plan.

pub mod apply;
pub mod catchup;
mod context;
pub mod copy;
pub mod copy_table;
pub mod fast_forward;
pub mod stream;

pub use context::CopyContext;
