//! Error types for placelink.

use thiserror::Error;

/// Result type for placelink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for placelink operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A persisted artifact (vocabulary, embedding, weights, labels) is
    /// missing or unreadable. Fatal at service startup.
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Loaded artifacts disagree on dimensions (e.g. embedding width vs
    /// classifier input). Fatal configuration error at load time.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dataset generation or parsing failed.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Model training failed.
    #[error("Training failed: {0}")]
    Training(String),

    /// Model inference failed.
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A retraining subprocess exited with a non-zero status.
    #[error("Retrain failed: {0}")]
    Retrain(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Candle tensor error.
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl Error {
    /// Create an artifact error.
    pub fn artifact(msg: impl Into<String>) -> Self {
        Error::Artifact(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a dataset error.
    pub fn dataset(msg: impl Into<String>) -> Self {
        Error::Dataset(msg.into())
    }

    /// Create a training error.
    pub fn training(msg: impl Into<String>) -> Self {
        Error::Training(msg.into())
    }

    /// Create an inference error.
    pub fn inference(msg: impl Into<String>) -> Self {
        Error::Inference(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a retrain error.
    pub fn retrain(msg: impl Into<String>) -> Self {
        Error::Retrain(msg.into())
    }
}
