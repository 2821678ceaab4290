pub mod api;
pub mod balance;
pub mod bench;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod query;
pub mod report;

pub use error::{BenchError, ErrorClass, Result};
