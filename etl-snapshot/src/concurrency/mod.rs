pub mod lag;
pub mod shutdown;
pub mod stream;
pub mod task;
