//! Helpers shared by the unit tests: copy contexts over in-memory collaborators, scripted
//! sources and event builders.

pub mod context;
pub mod event;
pub mod source;
