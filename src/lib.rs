// src/lib.rs

pub mod config;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod service;
pub mod test_utils;

pub use config::EngineConfig;
pub use error::{AnalysisError, Result};
pub use service::AnalysisOrchestrator;
