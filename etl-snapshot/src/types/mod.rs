mod batch;
mod event;
mod position;
mod table_row;

pub use batch::*;
pub use event::*;
pub use position::*;
pub use table_row::*;
