pub mod chunks;
pub mod crypto;
pub mod errors;
pub mod keys;
pub mod models;
