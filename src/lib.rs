pub mod core;
pub mod remote;
pub mod storage;
pub mod sync;
