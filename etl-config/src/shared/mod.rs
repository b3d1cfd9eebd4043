mod base;
mod batch;
mod copy;

pub use base::*;
pub use batch::*;
pub use copy::*;
