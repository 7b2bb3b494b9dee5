pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod processors;
pub mod query;
pub mod readers;
pub mod storage;
pub mod utils;

pub use config::PipelineConfig;
pub use error::{ProcessingError, Result};
