//! One file-selection event, end to end.
//!
//! Extract constraints, plan, run the sequential executor (one file) or the
//! merge orchestrator (several files), then hand the result to the host.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::artifact::FileArtifact;
use crate::constraints::{extract_constraints, FileInputAttrs};
use crate::error::PipelineError;
use crate::handoff::{ArtifactHandoff, HandoffError, Naming, RunTag, MERGED_DOWNLOAD_NAME};
use crate::merge::MergeOrchestrator;
use crate::pipeline::{Completion, RunReport, SequentialExecutor};
use crate::planner::plan_into;
use crate::transport::Transport;

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
}

#[derive(Debug)]
pub enum SelectionOutcome {
    /// The selection already satisfies the constraints.
    Unchanged,
    /// The selection was replaced by `artifact`.  `download` is set when the
    /// result was also offered as a download (compressed PDFs).
    Replaced { artifact: FileArtifact, report: RunReport, download: Option<PathBuf> },
    /// The service returned an archive; it was downloaded to `path` and the
    /// selection left alone.
    Downloaded { artifact: FileArtifact, report: RunReport, path: PathBuf },
    /// Several files were merged into `artifact`, downloaded to `path`.
    Merged { artifact: FileArtifact, path: PathBuf },
    /// A newer selection arrived while this run was in flight.
    Discarded,
}

pub struct FormProcessor<T: Transport + Clone> {
    executor: SequentialExecutor<T>,
    merger:   MergeOrchestrator<T>,
}

impl<T: Transport + Clone> FormProcessor<T> {
    pub fn new(transport: T, password: &str) -> Self {
        Self {
            executor: SequentialExecutor::new(transport.clone(), password),
            merger:   MergeOrchestrator::new(transport, password),
        }
    }

    pub fn executor(&self) -> &SequentialExecutor<T> { &self.executor }

    pub fn merger(&self) -> &MergeOrchestrator<T> { &self.merger }

    /// Handle the selection identified by `tag`.
    pub fn on_selection<H: ArtifactHandoff>(
        &self,
        handoff:   &mut H,
        tag:       &RunTag,
        files:     Vec<FileArtifact>,
        input:     &FileInputAttrs,
        page_text: &str,
    ) -> Result<SelectionOutcome, SelectionError> {
        info!(run = %tag.id, files = files.len(), fingerprint = %tag.fingerprint_hex(), "selection received");

        if files.len() > 1 {
            let merged = self.merger.merge(&files)?;
            return match handoff.replace_selection(tag, &merged, Naming::Merged) {
                Ok(artifact) => {
                    let path = handoff.download(&artifact, MERGED_DOWNLOAD_NAME)?;
                    Ok(SelectionOutcome::Merged { artifact, path })
                }
                Err(HandoffError::StaleRun(id)) => {
                    warn!(run = %id, "merged result discarded");
                    Ok(SelectionOutcome::Discarded)
                }
                Err(e) => Err(e.into()),
            };
        }

        let Some(file) = files.into_iter().next() else {
            return Err(HandoffError::NoSelection.into());
        };
        let constraints = plan_into(file.meta(), &extract_constraints(input, page_text));
        if constraints.operations.is_empty() {
            info!(file = file.name(), "file meets constraints; nothing to do");
            return Ok(SelectionOutcome::Unchanged);
        }

        let report = self.executor.run(file, &constraints)?;
        if report.completion.is_archive() {
            if !handoff.is_current(tag) {
                warn!(run = %tag.id, name = report.artifact.name(), "archive result discarded");
                return Ok(SelectionOutcome::Discarded);
            }
            info!(name = report.artifact.name(), "archive result; downloading");
            let path = handoff.download(&report.artifact, report.artifact.name())?;
            return Ok(SelectionOutcome::Downloaded { artifact: report.artifact.clone(), report, path });
        }

        match handoff.replace_selection(tag, &report.artifact, Naming::Processed) {
            Ok(artifact) => {
                // Compressed PDFs are also offered as a download.
                let download = match report.completion {
                    Completion::ShortCircuited(_) => Some(handoff.download(&report.artifact, report.artifact.name())?),
                    _ => None,
                };
                Ok(SelectionOutcome::Replaced { artifact, report, download })
            }
            Err(HandoffError::StaleRun(id)) => {
                warn!(run = %id, "result discarded");
                Ok(SelectionOutcome::Discarded)
            }
            Err(e) => Err(e.into()),
        }
    }
}
