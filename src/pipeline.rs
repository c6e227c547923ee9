//! Sequential pipeline executor.
//!
//! A run is an explicit state value.  [`SequentialExecutor::step`] consumes
//! one [`RunState`] and returns the next, so nothing about a run lives in the
//! executor itself and independent runs never share mutable state.
//!
//! ```text
//!   Pending[op0, op1, ..] ──op0 ok──▶ Pending[op1, ..] ──▶ .. ──▶ Completed
//!          │                    │
//!          │ error              └─ compress / archive body ──▶ Completed
//!          ▼
//!       Aborted
//! ```
//!
//! Each transition encrypts the current artifact, posts it to the
//! operation's endpoint, and either decrypts the response into the next
//! artifact or terminates the run with the raw response body.

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::artifact::{extension_for_mime, with_extension, FileArtifact, OCTET_STREAM};
use crate::constraints::Constraints;
use crate::envelope;
use crate::error::PipelineError;
use crate::operation::{OperationKind, ResponsePolicy};
use crate::transport::{FilePart, RequestBody, ServiceRequest, ServiceResponse, Transport};

/// Form field carrying the envelope for single-file operations.
pub const FILE_FIELD: &str = "file";
/// Form field carrying the JSON constraints.
pub const CONSTRAINTS_FIELD: &str = "constraints";

/// Name given to the PDF returned by `compress`.
pub const COMPRESSED_NAME: &str = "compressed.pdf";

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum RunState {
    Pending {
        current:   FileArtifact,
        remaining: VecDeque<OperationKind>,
        executed:  Vec<OperationKind>,
    },
    Completed(RunReport),
    Aborted(PipelineError),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Pending { .. })
    }
}

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Nothing was planned; the artifact is the original file.
    NoOp,
    /// Every planned operation ran.
    Finished,
    /// The named operation returned a final, non-envelope body.
    ShortCircuited(OperationKind),
}

impl Completion {
    /// The run ended with an archive from the service rather than a file of
    /// the selected kind.
    pub fn is_archive(self) -> bool {
        matches!(self, Completion::ShortCircuited(op) if op.response_policy() != ResponsePolicy::FinalPdf)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub artifact:   FileArtifact,
    pub executed:   Vec<OperationKind>,
    pub completion: Completion,
}

enum Transition {
    Advance(FileArtifact),
    Terminate(FileArtifact),
}

// ── Executor ──────────────────────────────────────────────────────────────────

pub struct SequentialExecutor<T: Transport> {
    transport: T,
    password:  String,
}

impl<T: Transport> SequentialExecutor<T> {
    pub fn new(transport: T, password: impl Into<String>) -> Self {
        Self { transport, password: password.into() }
    }

    pub fn transport(&self) -> &T { &self.transport }

    /// Initial state for `artifact` under the operations in `constraints`.
    pub fn start(&self, artifact: FileArtifact, constraints: &Constraints) -> RunState {
        if constraints.operations.is_empty() {
            return RunState::Completed(RunReport {
                artifact,
                executed:   Vec::new(),
                completion: Completion::NoOp,
            });
        }
        RunState::Pending {
            current:   artifact,
            remaining: constraints.operations.iter().copied().collect(),
            executed:  Vec::new(),
        }
    }

    /// Advance a run by one operation.  Terminal states are returned as is.
    pub fn step(&self, state: RunState, constraints: &Constraints) -> RunState {
        let (current, mut remaining, mut executed) = match state {
            RunState::Pending { current, remaining, executed } => (current, remaining, executed),
            terminal => return terminal,
        };
        let Some(op) = remaining.pop_front() else {
            return RunState::Completed(RunReport {
                artifact:   current,
                executed,
                completion: Completion::Finished,
            });
        };

        debug!(op = %op, step = executed.len(), file = current.name(), "running operation");
        match self.transition(&current, op, constraints) {
            Ok(Transition::Advance(next)) => {
                executed.push(op);
                info!(op = %op, size = next.size(), mime = next.mime(), "operation completed");
                if remaining.is_empty() {
                    RunState::Completed(RunReport { artifact: next, executed, completion: Completion::Finished })
                } else {
                    RunState::Pending { current: next, remaining, executed }
                }
            }
            Ok(Transition::Terminate(fin)) => {
                executed.push(op);
                if !remaining.is_empty() {
                    info!(op = %op, skipped = remaining.len(), "final artifact received; skipping remaining operations");
                }
                RunState::Completed(RunReport {
                    artifact:   fin,
                    executed,
                    completion: Completion::ShortCircuited(op),
                })
            }
            Err(e) => {
                warn!(op = %op, error = %e, "operation failed; aborting run");
                RunState::Aborted(e)
            }
        }
    }

    /// Drive `artifact` through every operation in `constraints`.
    pub fn run(&self, artifact: FileArtifact, constraints: &Constraints) -> Result<RunReport, PipelineError> {
        info!(file = artifact.name(), ops = ?constraints.operations, "starting run");
        let mut state = self.start(artifact, constraints);
        loop {
            state = match state {
                RunState::Completed(report) => return Ok(report),
                RunState::Aborted(e)        => return Err(e),
                pending                     => self.step(pending, constraints),
            };
        }
    }

    /// Run one explicitly requested operation, as the popup does.
    /// `compress` on an image is routed to the image compressor; `merge` is
    /// refused.
    pub fn run_requested(&self, artifact: FileArtifact, requested: OperationKind) -> Result<RunReport, PipelineError> {
        if !requested.is_single_file() {
            return Err(PipelineError::NotSingleFile(requested));
        }
        let op = requested.resolve_manual(artifact.mime());
        self.run(artifact, &Constraints::for_operations(vec![op]))
    }

    fn transition(
        &self,
        current:     &FileArtifact,
        op:          OperationKind,
        constraints: &Constraints,
    ) -> Result<Transition, PipelineError> {
        if !op.is_single_file() {
            return Err(PipelineError::NotSingleFile(op));
        }
        let sealed = envelope::encrypt(current.bytes(), &self.password)?;
        let request = ServiceRequest {
            endpoint: op.endpoint(),
            password: Some(self.password.clone()),
            body: RequestBody::Multipart {
                parts: vec![FilePart {
                    field:    FILE_FIELD,
                    filename: current.name().to_string(),
                    mime:     OCTET_STREAM.to_string(),
                    bytes:    sealed.into_bytes(),
                }],
                fields: vec![(CONSTRAINTS_FIELD.to_string(), constraints.to_json()?)],
            },
        };

        let response = self.transport.send(request)?;
        if !response.is_success() {
            return Err(PipelineError::RemoteService { operation: op, status: response.status });
        }

        if op.response_policy() == ResponsePolicy::FinalPdf {
            return Ok(Transition::Terminate(FileArtifact::new(COMPRESSED_NAME, "application/pdf", response.body)));
        }
        if response.is_archive() {
            return Ok(Transition::Terminate(archive_artifact(op, response)));
        }

        let plaintext = envelope::decrypt(&response.body, &self.password)?;
        let mime = response.restored_type().unwrap_or(current.mime()).to_string();
        let name = renamed_for(current, &mime);
        Ok(Transition::Advance(FileArtifact::new(name, mime, plaintext)))
    }
}

fn archive_artifact(op: OperationKind, response: ServiceResponse) -> FileArtifact {
    let mime = response
        .content_type
        .as_deref()
        .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_string())
        .unwrap_or_else(|| "application/zip".to_string());
    let ext = extension_for_mime(&mime).unwrap_or(".zip");
    FileArtifact::new(format!("decrypted_{op}_results{ext}"), mime, response.body)
}

/// Keep the name unless the content type changed to one with a different
/// known extension.
fn renamed_for(current: &FileArtifact, mime: &str) -> String {
    if mime == current.mime() {
        return current.name().to_string();
    }
    match extension_for_mime(mime) {
        Some(ext) if ext != current.extension() => with_extension(current.name(), ext),
        _ => current.name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use std::sync::Mutex;

    const PW: &str = "password123";

    /// Replays canned responses and records every request.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<ServiceResponse>>,
        seen:      Mutex<Vec<ServiceRequest>>,
    }

    impl Scripted {
        fn new(responses: Vec<ServiceResponse>) -> Self {
            Self { responses: Mutex::new(responses.into()), seen: Mutex::default() }
        }
        fn endpoints(&self) -> Vec<String> {
            self.seen.lock().unwrap().iter().map(|r| r.endpoint.clone()).collect()
        }
    }

    impl Transport for Scripted {
        fn send(&self, request: ServiceRequest) -> Result<ServiceResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            self.responses.lock().unwrap().pop_front().ok_or(TransportError::Timeout)
        }
    }

    fn sealed(data: &[u8]) -> Vec<u8> {
        envelope::encrypt(data, PW).unwrap().into_bytes()
    }

    fn jpeg() -> FileArtifact {
        FileArtifact::new("photo.jpg", "image/jpeg", b"jpeg bytes".to_vec())
    }

    #[test]
    fn empty_plan_is_noop() {
        let t = Scripted::default();
        let exec = SequentialExecutor::new(&t, PW);
        let report = exec.run(jpeg(), &Constraints::default()).unwrap();
        assert_eq!(report.completion, Completion::NoOp);
        assert_eq!(report.artifact, jpeg());
        assert!(t.endpoints().is_empty());
    }

    #[test]
    fn chains_decrypted_output() {
        let t = Scripted::new(vec![
            ServiceResponse::ok(sealed(b"png bytes")).with_original_content_type("image/png"),
            ServiceResponse::ok(sealed(b"small png")).with_original_content_type(""),
        ]);
        let exec = SequentialExecutor::new(&t, PW);
        let c = Constraints::for_operations(vec![OperationKind::Convert, OperationKind::ImgCompressor]);
        let report = exec.run(jpeg(), &c).unwrap();

        assert_eq!(report.completion, Completion::Finished);
        assert_eq!(report.executed, c.operations);
        assert_eq!(report.artifact.bytes(), b"small png");
        assert_eq!(report.artifact.mime(), "image/png");
        assert_eq!(report.artifact.name(), "photo.png");
        assert_eq!(t.endpoints(), vec!["/convert", "/imgCompressor"]);
    }

    #[test]
    fn request_shape() {
        let t = Scripted::new(vec![ServiceResponse::ok(sealed(b"x"))]);
        let exec = SequentialExecutor::new(&t, PW);
        let c = Constraints::for_operations(vec![OperationKind::Convert]);
        exec.run(jpeg(), &c).unwrap();

        let seen = t.seen.lock().unwrap();
        let req = &seen[0];
        assert_eq!(req.password.as_deref(), Some(PW));
        let RequestBody::Multipart { parts, fields } = &req.body else { panic!("expected multipart") };
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].field, FILE_FIELD);
        assert_eq!(parts[0].filename, "photo.jpg");
        assert_eq!(envelope::decrypt(&parts[0].bytes, PW).unwrap(), b"jpeg bytes");
        assert_eq!(fields[0].0, CONSTRAINTS_FIELD);
        let sent: Constraints = serde_json::from_str(&fields[0].1).unwrap();
        assert_eq!(sent, c);
    }

    #[test]
    fn archive_response_terminates() {
        let t = Scripted::new(vec![
            ServiceResponse::ok(b"PK\x03\x04zip".to_vec()).with_content_type("application/zip"),
        ]);
        let exec = SequentialExecutor::new(&t, PW);
        let c = Constraints::for_operations(vec![OperationKind::Split, OperationKind::Convert]);
        let report = exec.run(FileArtifact::new("doc.pdf", "application/pdf", b"%PDF".to_vec()), &c).unwrap();

        assert_eq!(report.completion, Completion::ShortCircuited(OperationKind::Split));
        assert!(report.completion.is_archive());
        assert_eq!(report.artifact.name(), "decrypted_split_results.zip");
        assert_eq!(report.artifact.bytes(), b"PK\x03\x04zip");
        assert_eq!(t.endpoints(), vec!["/split"]);
    }

    #[test]
    fn undecryptable_body_aborts() {
        let t = Scripted::new(vec![ServiceResponse::ok(b"not an envelope".to_vec())]);
        let exec = SequentialExecutor::new(&t, PW);
        let err = exec.run(jpeg(), &Constraints::for_operations(vec![OperationKind::Convert])).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedEnvelope);
    }

    #[test]
    fn transport_timeout_aborts() {
        let t = Scripted::default();
        let exec = SequentialExecutor::new(&t, PW);
        let err = exec.run(jpeg(), &Constraints::for_operations(vec![OperationKind::Convert])).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Timeout);
    }

    #[test]
    fn step_on_terminal_is_identity() {
        let t = Scripted::default();
        let exec = SequentialExecutor::new(&t, PW);
        let done = exec.start(jpeg(), &Constraints::default());
        let again = exec.step(done, &Constraints::default());
        assert!(matches!(again, RunState::Completed(RunReport { completion: Completion::NoOp, .. })));
    }

    #[test]
    fn requested_compress_on_image_uses_image_endpoint() {
        let t = Scripted::new(vec![ServiceResponse::ok(sealed(b"smaller"))]);
        let exec = SequentialExecutor::new(&t, PW);
        let report = exec.run_requested(jpeg(), OperationKind::Compress).unwrap();
        assert_eq!(t.endpoints(), vec!["/imgCompressor"]);
        assert_eq!(report.artifact.bytes(), b"smaller");
        assert_eq!(report.artifact.name(), "photo.jpg");
    }

    #[test]
    fn requested_merge_is_refused() {
        let t = Scripted::new(vec![ServiceResponse::ok(sealed(b"%PDF"))]);
        let exec = SequentialExecutor::new(&t, PW);
        let pdf = FileArtifact::new("a.pdf", "application/pdf", b"%PDF-a".to_vec());
        let err = exec.run_requested(pdf, OperationKind::Merge).unwrap_err();
        assert!(matches!(err, PipelineError::NotSingleFile(OperationKind::Merge)));
        assert!(t.endpoints().is_empty());
    }

    #[test]
    fn planned_merge_aborts_before_sending() {
        let t = Scripted::new(vec![ServiceResponse::ok(sealed(b"png"))]);
        let exec = SequentialExecutor::new(&t, PW);
        let c = Constraints::for_operations(vec![OperationKind::Merge, OperationKind::Convert]);
        let err = exec.run(jpeg(), &c).unwrap_err();
        assert!(matches!(err, PipelineError::NotSingleFile(OperationKind::Merge)));
        assert!(t.endpoints().is_empty());
    }

    #[test]
    fn compressed_pdf_is_not_an_archive() {
        assert!(!Completion::ShortCircuited(OperationKind::Compress).is_archive());
        assert!(Completion::ShortCircuited(OperationKind::Convert).is_archive());
        assert!(!Completion::Finished.is_archive());
        assert!(!Completion::NoOp.is_archive());
    }
}
