pub mod backup;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod executor;
pub mod metadata;
pub mod registry;
pub mod retention;
pub mod scheduler;
pub mod scope;
pub mod store;
pub mod transfer;
pub mod verifier;

pub use error::{Result, VaultError};
