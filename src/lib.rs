pub mod checker;
pub mod config;
pub mod engine;
pub mod error;
pub mod fsutil;
pub mod report;
pub mod source;
pub mod telemetry;

pub use error::{Result, WorkerError};
