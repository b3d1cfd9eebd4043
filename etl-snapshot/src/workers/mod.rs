pub mod base;
pub mod copy;
