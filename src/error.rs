//! Run-level errors.
//!
//! Any error inside a run aborts it; nothing is retried and no partial
//! artifact is produced.  [`PipelineError::kind`] collapses the variants to
//! the error kinds the adapter layer reports to the user.

use thiserror::Error;

use crate::envelope::EnvelopeError;
use crate::operation::OperationKind;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Service rejected /{operation} with HTTP {status}")]
    RemoteService { operation: OperationKind, status: u16 },
    #[error("Service rejected /process with HTTP {status}")]
    ProcessRejected { status: u16 },
    #[error("Operation '{0}' takes several files and only runs through the merge orchestrator")]
    NotSingleFile(OperationKind),
    #[error("Merged result is not a PDF document")]
    InvalidMergeResult,
    #[error("Merge needs at least 2 files, got {0}")]
    NotEnoughFiles(usize),
    #[error("Malformed service payload: {0}")]
    Payload(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// User-facing classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedEnvelope,
    DecryptionError,
    InvalidPadding,
    EncryptionError,
    RemoteServiceError,
    InvalidMergeResult,
    Timeout,
    /// Connection failures, bad input and other local problems.
    Other,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Envelope(e) => match e {
                EnvelopeError::Malformed { .. } => ErrorKind::MalformedEnvelope,
                EnvelopeError::Encryption(_)    => ErrorKind::EncryptionError,
                EnvelopeError::Decryption       => ErrorKind::DecryptionError,
                EnvelopeError::InvalidPadding   => ErrorKind::InvalidPadding,
            },
            PipelineError::Transport(TransportError::Timeout) => ErrorKind::Timeout,
            PipelineError::RemoteService { .. }
            | PipelineError::ProcessRejected { .. }           => ErrorKind::RemoteServiceError,
            PipelineError::InvalidMergeResult                 => ErrorKind::InvalidMergeResult,
            PipelineError::Transport(_)
            | PipelineError::NotEnoughFiles(_)
            | PipelineError::NotSingleFile(_)
            | PipelineError::Payload(_)
            | PipelineError::Serialization(_)                 => ErrorKind::Other,
        }
    }
}
