mod base;
mod file;
mod memory;

pub use base::*;
pub use file::*;
pub use memory::*;
