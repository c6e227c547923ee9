//! Handing a finished artifact back to the host.
//!
//! [`FileInputSlot`] stands in for the form's file control.  Every selection
//! issues a fresh [`RunTag`]; a result is only applied while its tag is the
//! latest one, so a slow run can never overwrite a newer selection.  Runs
//! are not cancelled, their late results are just dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifact::{extension_of, FileArtifact};
use crate::merge::MERGED_NAME;
use crate::operation::OperationKind;
use crate::pipeline::RunReport;

/// Prefix of the synthesized file that replaces a processed selection.
pub const PROCESSED_PREFIX: &str = "processed_";
/// Download name for merged output.
pub const MERGED_DOWNLOAD_NAME: &str = "merged_result.pdf";

#[derive(Error, Debug)]
pub enum HandoffError {
    #[error("Refusing to hand off empty artifact '{0}'")]
    EmptyArtifact(String),
    #[error("Run {0} was superseded by a newer selection")]
    StaleRun(Uuid),
    #[error("Nothing is selected")]
    NoSelection,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Identity of one run: which selection started it and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTag {
    pub id:          Uuid,
    /// Name of the first selected file.
    pub file_name:   String,
    /// BLAKE3 over the fingerprints of every selected file.
    pub fingerprint: [u8; 32],
    pub started_at:  DateTime<Utc>,
}

impl RunTag {
    fn for_selection(files: &[FileArtifact]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for f in files {
            hasher.update(&f.fingerprint());
        }
        Self {
            id:          Uuid::new_v4(),
            file_name:   files.first().map(|f| f.name().to_string()).unwrap_or_default(),
            fingerprint: hasher.finalize().into(),
            started_at:  Utc::now(),
        }
    }

    pub fn fingerprint_hex(&self) -> String { hex::encode(&self.fingerprint[..8]) }
}

/// How the replacement file is named.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
    /// `processed_<original name>`.
    Processed,
    /// `merged_file.pdf`.
    Merged,
}

/// Name of the synthesized replacement for a selection started by `tag`.
pub fn replacement_name(tag: &RunTag, naming: Naming) -> String {
    match naming {
        Naming::Processed => format!("{PROCESSED_PREFIX}{}", tag.file_name),
        Naming::Merged    => MERGED_NAME.to_string(),
    }
}

/// Download name for an explicitly requested operation:
/// `<op>_result<original extension>`.
pub fn requested_download_name(op: OperationKind, original: &str) -> String {
    format!("{op}_result{}", extension_of(original))
}

/// Download name for the result of a requested run.  Archives keep the name
/// the executor gave them so their extension matches their content.
pub fn requested_result_name(report: &RunReport, op: OperationKind, original: &str) -> String {
    if report.completion.is_archive() {
        return report.artifact.name().to_string();
    }
    requested_download_name(op, original)
}

// ── FileInputSlot ─────────────────────────────────────────────────────────────

/// The form control whose selection the pipeline replaces.
#[derive(Debug, Default)]
pub struct FileInputSlot {
    files:  Vec<FileArtifact>,
    latest: Option<RunTag>,
}

impl FileInputSlot {
    pub fn new() -> Self { Self::default() }

    /// Record a new selection.  Any run started before this one is stale
    /// from now on.
    pub fn select(&mut self, files: Vec<FileArtifact>) -> RunTag {
        let tag = RunTag::for_selection(&files);
        if let Some(prev) = &self.latest {
            info!(previous = %prev.id, current = %tag.id, "selection superseded");
        }
        self.files = files;
        self.latest = Some(tag.clone());
        tag
    }

    pub fn files(&self) -> &[FileArtifact] { &self.files }

    pub fn is_current(&self, tag: &RunTag) -> bool {
        self.latest.as_ref().is_some_and(|t| t.id == tag.id)
    }

    /// Replace the selection with `artifact`, renamed per `naming`.
    pub fn apply(&mut self, tag: &RunTag, artifact: &FileArtifact, naming: Naming) -> Result<&FileArtifact, HandoffError> {
        if self.latest.is_none() {
            return Err(HandoffError::NoSelection);
        }
        if !self.is_current(tag) {
            warn!(run = %tag.id, file = %tag.file_name, "discarding result of stale run");
            return Err(HandoffError::StaleRun(tag.id));
        }
        if artifact.is_empty() {
            return Err(HandoffError::EmptyArtifact(artifact.name().to_string()));
        }
        let replacement = artifact.renamed(replacement_name(tag, naming));
        info!(run = %tag.id, name = replacement.name(), size = replacement.size(), "selection replaced");
        self.files = vec![replacement];
        Ok(&self.files[0])
    }
}

// ── ArtifactHandoff ───────────────────────────────────────────────────────────

/// Host-side sink for finished artifacts.
pub trait ArtifactHandoff {
    /// Whether `tag` still identifies the latest selection.
    fn is_current(&self, tag: &RunTag) -> bool;

    /// Replace the triggering control's selection.
    fn replace_selection(&mut self, tag: &RunTag, artifact: &FileArtifact, naming: Naming) -> Result<FileArtifact, HandoffError>;

    /// Offer `artifact` for download as `filename`.
    fn download(&mut self, artifact: &FileArtifact, filename: &str) -> Result<PathBuf, HandoffError>;
}

/// Handoff for a local adapter: the slot is kept in memory and downloads are
/// written into a directory.
#[derive(Debug)]
pub struct DirectoryHandoff {
    pub slot: FileInputSlot,
    dir:      PathBuf,
}

impl DirectoryHandoff {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { slot: FileInputSlot::new(), dir: dir.as_ref().to_owned() }
    }

    pub fn dir(&self) -> &Path { &self.dir }
}

impl ArtifactHandoff for DirectoryHandoff {
    fn is_current(&self, tag: &RunTag) -> bool { self.slot.is_current(tag) }

    fn replace_selection(&mut self, tag: &RunTag, artifact: &FileArtifact, naming: Naming) -> Result<FileArtifact, HandoffError> {
        self.slot.apply(tag, artifact, naming).cloned()
    }

    fn download(&mut self, artifact: &FileArtifact, filename: &str) -> Result<PathBuf, HandoffError> {
        if artifact.is_empty() {
            return Err(HandoffError::EmptyArtifact(artifact.name().to_string()));
        }
        // Only the final component: a service-chosen name must not escape the directory.
        let safe = Path::new(filename)
            .file_name()
            .map(|n| n.to_owned())
            .unwrap_or_else(|| "download.bin".into());
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        let path = self.dir.join(safe);
        fs::write(&path, artifact.bytes())?;
        info!(path = %path.display(), size = artifact.size(), "artifact saved");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Completion;

    fn file(name: &str, bytes: &[u8]) -> FileArtifact {
        FileArtifact::new(name, "application/pdf", bytes.to_vec())
    }

    #[test]
    fn processed_name_uses_trigger() {
        let mut slot = FileInputSlot::new();
        let tag = slot.select(vec![file("cv.pdf", b"a")]);
        let out = slot.apply(&tag, &file("compressed.pdf", b"small"), Naming::Processed).unwrap();
        assert_eq!(out.name(), "processed_cv.pdf");
        assert_eq!(slot.files().len(), 1);
    }

    #[test]
    fn stale_result_is_discarded() {
        let mut slot = FileInputSlot::new();
        let old = slot.select(vec![file("a.pdf", b"a")]);
        let new = slot.select(vec![file("b.pdf", b"b")]);
        assert!(matches!(slot.apply(&old, &file("x", b"x"), Naming::Processed), Err(HandoffError::StaleRun(id)) if id == old.id));
        assert_eq!(slot.files()[0].name(), "b.pdf");
        assert!(slot.apply(&new, &file("x", b"x"), Naming::Processed).is_ok());
    }

    #[test]
    fn empty_artifact_is_refused() {
        let mut slot = FileInputSlot::new();
        let tag = slot.select(vec![file("a.pdf", b"a")]);
        assert!(matches!(slot.apply(&tag, &file("a.pdf", b""), Naming::Processed), Err(HandoffError::EmptyArtifact(_))));
    }

    #[test]
    fn same_content_different_run() {
        let mut slot = FileInputSlot::new();
        let a = slot.select(vec![file("a.pdf", b"same")]);
        let b = slot.select(vec![file("a.pdf", b"same")]);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.id, b.id);
        assert!(!slot.is_current(&a));
    }

    #[test]
    fn download_writes_file_name_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = DirectoryHandoff::new(dir.path().join("out"));
        let path = h.download(&file("m.pdf", b"%PDF-1.4"), "../../merged_result.pdf").unwrap();
        assert_eq!(path, dir.path().join("out").join("merged_result.pdf"));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
        assert!(h.download(&file("e.pdf", b""), "e.pdf").is_err());
    }

    #[test]
    fn requested_names() {
        assert_eq!(requested_download_name(OperationKind::ImgCompressor, "a.PNG"), "imgCompressor_result.png");
        assert_eq!(requested_download_name(OperationKind::Split, "doc.pdf"), "split_result.pdf");
    }

    #[test]
    fn requested_archive_keeps_its_extension() {
        let zip = RunReport {
            artifact:   FileArtifact::new("decrypted_split_results.zip", "application/zip", b"PK".to_vec()),
            executed:   vec![OperationKind::Split],
            completion: Completion::ShortCircuited(OperationKind::Split),
        };
        assert_eq!(requested_result_name(&zip, OperationKind::Split, "doc.pdf"), "decrypted_split_results.zip");

        let pdf = RunReport {
            artifact:   FileArtifact::new("compressed.pdf", "application/pdf", b"%PDF".to_vec()),
            executed:   vec![OperationKind::Compress],
            completion: Completion::ShortCircuited(OperationKind::Compress),
        };
        assert_eq!(requested_result_name(&pdf, OperationKind::Compress, "doc.pdf"), "compress_result.pdf");
    }

    #[test]
    fn directory_handoff_tracks_latest_selection() {
        let mut h = DirectoryHandoff::new(std::env::temp_dir());
        let old = h.slot.select(vec![file("a.pdf", b"a")]);
        assert!(h.is_current(&old));
        let new = h.slot.select(vec![file("b.pdf", b"b")]);
        assert!(!h.is_current(&old));
        assert!(h.is_current(&new));
    }
}
