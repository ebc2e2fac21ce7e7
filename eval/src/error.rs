// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error taxonomy shared by every pipeline stage

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while partitioning, persisting, training or evaluating
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed dataset or label structure
    #[error("Format error: {0}")]
    Format(String),

    /// File read/write or serialization failure
    #[error("I/O error on {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Requested classifier could not be created
    #[error("Cannot instantiate classifier {classifier}: {reason}")]
    ClassifierInstantiation { classifier: String, reason: String },

    /// Model construction failed
    #[error("Training error: {0}")]
    Training(String),

    /// Model evaluation failed
    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

impl PipelineError {
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// I/O failure without an underlying `std::io::Error` (e.g. encoding)
    pub fn io_message(path: &Path, message: impl Into<String>) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: message.into(),
            source: None,
        }
    }

    pub fn training(message: impl Into<String>) -> Self {
        Self::Training(message.into())
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }

    /// Short category name used in log lines and summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Format(_) => "FormatError",
            Self::Io { .. } => "IOError",
            Self::ClassifierInstantiation { .. } => "ClassifierInstantiationError",
            Self::Training(_) => "TrainingError",
            Self::Evaluation(_) => "EvaluationError",
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
