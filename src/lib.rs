pub mod audit;
pub mod config;
pub mod encryption;
pub mod migrate;
pub mod ops;
pub mod pii;
pub mod store;
