use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The policy checkpoint handed to a driver does not exist.
    #[error("model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("failed to create run directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to write report: {0}")]
    Report(#[source] io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("python: {0}")]
    Python(#[from] pyo3::PyErr),

    #[error("torch: {0}")]
    Torch(#[from] tch::TchError),

    /// For [`crate::env::Env`] implementations that are not backed by Python,
    /// which have no other way to report a failure.
    #[error("environment: {0}")]
    Env(String),

    #[error("policy: {0}")]
    Policy(String),
}

impl Error {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ModelNotFound(_))
    }
}
