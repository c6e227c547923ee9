//! Merge orchestrator: several files in, one PDF out.
//!
//! Every input is sealed independently.  With the `parallel` feature the
//! sealing runs on the Rayon pool; otherwise each file gets a scoped thread.
//! Either way the workers share nothing mutable: each returns an owned
//! envelope, and the request is built only after all of them finished.

use tracing::{debug, info, warn};

use crate::artifact::{FileArtifact, OCTET_STREAM};
use crate::constraints::Constraints;
use crate::envelope::{self, Envelope, EnvelopeError};
use crate::error::PipelineError;
use crate::operation::OperationKind;
use crate::pipeline::CONSTRAINTS_FIELD;
use crate::transport::{FilePart, RequestBody, ServiceRequest, Transport};

/// Repeated form field carrying one envelope per input file.
pub const FILES_FIELD: &str = "files";
/// Name of the merged artifact handed back to the form.
pub const MERGED_NAME: &str = "merged_file.pdf";
/// Leading bytes of every PDF document.
pub const PDF_SIGNATURE: &[u8; 4] = b"%PDF";

/// One input after sealing, in input order.
#[derive(Debug, Clone)]
pub struct SealedFile {
    pub name:     String,
    pub envelope: Envelope,
}

/// Seal `files` concurrently.  Output order matches input order; the first
/// failure is returned.
pub fn seal_all(files: &[FileArtifact], password: &str) -> Result<Vec<SealedFile>, EnvelopeError> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        files
            .par_iter()
            .map(|f| seal_one(f, password))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        std::thread::scope(|scope| {
            let workers: Vec<_> = files
                .iter()
                .map(|f| scope.spawn(move || seal_one(f, password)))
                .collect();
            workers
                .into_iter()
                .map(|w| {
                    w.join().unwrap_or_else(|_| {
                        Err(EnvelopeError::Encryption("sealing worker panicked".to_string()))
                    })
                })
                .collect()
        })
    }
}

fn seal_one(file: &FileArtifact, password: &str) -> Result<SealedFile, EnvelopeError> {
    Ok(SealedFile {
        name:     file.name().to_string(),
        envelope: envelope::encrypt(file.bytes(), password)?,
    })
}

pub struct MergeOrchestrator<T: Transport> {
    transport: T,
    password:  String,
}

impl<T: Transport> MergeOrchestrator<T> {
    pub fn new(transport: T, password: impl Into<String>) -> Self {
        Self { transport, password: password.into() }
    }

    /// Merge `files` (at least two) into one PDF.
    pub fn merge(&self, files: &[FileArtifact]) -> Result<FileArtifact, PipelineError> {
        if files.len() < 2 {
            return Err(PipelineError::NotEnoughFiles(files.len()));
        }
        info!(count = files.len(), "merging files");

        let sealed = seal_all(files, &self.password)?;
        debug!(count = sealed.len(), "all inputs sealed");

        let parts = sealed
            .into_iter()
            .map(|s| FilePart {
                field:    FILES_FIELD,
                filename: s.name,
                mime:     OCTET_STREAM.to_string(),
                bytes:    s.envelope.into_bytes(),
            })
            .collect();
        let constraints = Constraints::for_operations(vec![OperationKind::Merge]);
        let request = ServiceRequest {
            endpoint: OperationKind::Merge.endpoint(),
            password: Some(self.password.clone()),
            body: RequestBody::Multipart {
                parts,
                fields: vec![(CONSTRAINTS_FIELD.to_string(), constraints.to_json()?)],
            },
        };

        let response = self.transport.send(request)?;
        if !response.is_success() {
            warn!(status = response.status, "merge rejected by service");
            return Err(PipelineError::RemoteService { operation: OperationKind::Merge, status: response.status });
        }

        let merged = envelope::decrypt(&response.body, &self.password)?;
        if !merged.starts_with(PDF_SIGNATURE) {
            warn!(len = merged.len(), "merged result lacks PDF signature");
            return Err(PipelineError::InvalidMergeResult);
        }
        info!(size = merged.len(), "merge completed");
        Ok(FileArtifact::new(MERGED_NAME, "application/pdf", merged))
    }
}
