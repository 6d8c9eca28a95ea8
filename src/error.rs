//! Errors raised while training or evaluating the lander agent.
use polars::error::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    #[error("Report error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The environment only knows actions `0..4`.
    #[error("Invalid action: {0}")]
    InvalidAction(usize),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Missing parameter in weight snapshot: {0}")]
    MissingParameter(String),

    #[error("Parameter store lock poisoned")]
    LockPoisoned,

    #[error("Invalid agent config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
