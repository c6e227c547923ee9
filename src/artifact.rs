//! File payloads flowing between pipeline stages.
//!
//! A [`FileArtifact`] is immutable: every stage consumes one and produces a
//! new one.  The byte buffer is reference counted so handing an artifact to
//! the next stage never copies it.

use std::path::Path;
use std::sync::Arc;

/// MIME used when nothing better is known.
pub const OCTET_STREAM: &str = "application/octet-stream";

// ── MIME / extension table ────────────────────────────────────────────────────

/// `(extension, mime)` pairs.  The first entry for a MIME type is its
/// canonical extension.
const MIME_TABLE: &[(&str, &str)] = &[
    (".pdf",  "application/pdf"),
    (".png",  "image/png"),
    (".jpg",  "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".gif",  "image/gif"),
    (".webp", "image/webp"),
    (".bmp",  "image/bmp"),
    (".tif",  "image/tiff"),
    (".tiff", "image/tiff"),
    (".svg",  "image/svg+xml"),
    (".txt",  "text/plain"),
    (".csv",  "text/csv"),
    (".html", "text/html"),
    (".json", "application/json"),
    (".doc",  "application/msword"),
    (".docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    (".xls",  "application/vnd.ms-excel"),
    (".xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    (".ppt",  "application/vnd.ms-powerpoint"),
    (".pptx", "application/vnd.openxmlformats-officedocument.presentationml.presentation"),
    (".zip",  "application/zip"),
    (".tar",  "application/x-tar"),
    (".gz",   "application/gzip"),
    (".7z",   "application/x-7z-compressed"),
];

/// Look up the MIME type for a dot-prefixed extension (case-insensitive).
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    MIME_TABLE.iter().find(|(e, _)| *e == ext).map(|(_, m)| *m)
}

/// Canonical dot-prefixed extension for a MIME type.
///
/// Parameters (`; charset=...`) are ignored.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let base = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    MIME_TABLE.iter().find(|(_, m)| *m == base).map(|(e, _)| *e)
}

/// Lowercase, dot-prefixed extension of a file name (`".jpg"`), or `""` if
/// the name has no dot.
pub fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) => format!(".{}", ext.to_ascii_lowercase()),
        None           => String::new(),
    }
}

/// Replace (or add) the extension of `name`.
pub fn with_extension(name: &str, ext: &str) -> String {
    let stem = name.rsplit_once('.').map(|(s, _)| s).unwrap_or(name);
    format!("{stem}{ext}")
}

// ── FileArtifact ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArtifact {
    name:  String,
    mime:  String,
    bytes: Arc<[u8]>,
}

impl FileArtifact {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self { name: name.into(), mime: mime.into(), bytes: bytes.into() }
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());
        let mime = mime_for_extension(&extension_of(&name)).unwrap_or(OCTET_STREAM);
        Ok(Self::new(name, mime, bytes))
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn mime(&self) -> &str { &self.mime }

    pub fn bytes(&self) -> &[u8] { &self.bytes }

    pub fn size(&self) -> u64 { self.bytes.len() as u64 }

    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    pub fn extension(&self) -> String { extension_of(&self.name) }

    pub fn is_image(&self) -> bool { self.mime.starts_with("image/") }

    /// BLAKE3 of the content, used to tag runs with their triggering file.
    pub fn fingerprint(&self) -> [u8; 32] {
        blake3::hash(&self.bytes).into()
    }

    /// Same bytes under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self { name: name.into(), mime: self.mime.clone(), bytes: Arc::clone(&self.bytes) }
    }

    pub fn meta(&self) -> FileMeta<'_> {
        FileMeta { name: &self.name, size: self.size(), mime: &self.mime }
    }
}

/// The subset of an artifact the planner looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta<'a> {
    pub name: &'a str,
    pub size: u64,
    pub mime: &'a str,
}

impl FileMeta<'_> {
    pub fn extension(&self) -> String { extension_of(self.name) }

    pub fn is_image(&self) -> bool { self.mime.starts_with("image/") }
}
