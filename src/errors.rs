//! Typed failures reported by the image-to-table pipeline.
//!
//! Everything else in this program uses [`anyhow::Error`], but callers need
//! to tell these apart (for example, to fall back to another recognition
//! engine when the local one is missing). They travel inside an
//! [`anyhow::Error`] and can be recovered with
//! [`anyhow::Error::downcast_ref`].

use std::process::ExitCode;

use crate::prelude::*;

/// A pipeline-level failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The recognition engine cannot be run at all. No trials were attempted.
    #[error("recognition engine {engine:?} is unavailable: {reason}")]
    EngineUnavailable { engine: String, reason: String },

    /// The input image could not be opened or decoded.
    #[error("cannot load image {path:?}: {reason}")]
    ImageLoad { path: PathBuf, reason: String },

    /// Every trial produced zero lines, so there is nothing to export.
    #[error("no viable trial: all {trial_count} trials produced zero lines")]
    NoViableTrial { trial_count: usize },

    /// The destination could not be written. Nothing was left behind.
    #[error("cannot write {path:?}")]
    ExportWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// The process exit code we use for this kind of failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::EngineUnavailable { .. } => 2,
            PipelineError::NoViableTrial { .. } => 3,
            PipelineError::ExportWriteFailed { .. } => 4,
            PipelineError::ImageLoad { .. } => 5,
        }
    }
}

/// Pick an exit code for an arbitrary error, looking for a [`PipelineError`]
/// anywhere in its chain.
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<PipelineError>())
        .map(|err| ExitCode::from(err.exit_code()))
        .unwrap_or(ExitCode::FAILURE)
}
