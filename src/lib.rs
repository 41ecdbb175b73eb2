pub mod audit;
pub mod config;
pub mod crypto;
pub mod database;
pub mod error;

pub use error::{LedgerError, Result};
