use handfuse_engine::errors::InferredError;
use handfuse_engine::record::TableId;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Rejected inferred result: {0}")]
    InvalidInferred(#[from] InferredError),
    #[error("Table {0} is no longer accepting results")]
    TableClosed(TableId),
    #[error("Table registry lock poisoned")]
    RegistryPoisoned,
}
