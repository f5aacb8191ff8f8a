//! Error types for pipeline runs and configuration loading.

use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed error produced by a source, stage or sink collaborator.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A fault that halted a pipeline run.
///
/// The variant says which part of the chain raised it; the driver pairs it
/// with the failing stage's name in [`Completion::Failure`](crate::Completion).
#[derive(Debug, Error)]
pub enum Fault {
    /// The source could not produce the next record.
    #[error("source fault: {0}")]
    Source(#[source] BoxError),

    /// A stage broke its contract while transforming a record.
    #[error("transform fault: {0}")]
    Transform(#[source] BoxError),

    /// The sink could not accept a record or finish the run.
    #[error("sink fault: {0}")]
    Sink(#[source] BoxError),
}

impl Fault {
    /// Short name of the fault class, as used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Fault::Source(_) => "SourceFault",
            Fault::Transform(_) => "TransformFault",
            Fault::Sink(_) => "SinkFault",
        }
    }

    /// The underlying collaborator error.
    pub fn cause(&self) -> &(dyn StdError + Send + Sync + 'static) {
        match self {
            Fault::Source(e) | Fault::Transform(e) | Fault::Sink(e) => e.as_ref(),
        }
    }
}

/// Errors raised while loading or validating a [`PipelineConfig`](crate::PipelineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid delimiter {0:?}: must be a single ASCII character other than a quote or line break")]
    Delimiter(char),
}
