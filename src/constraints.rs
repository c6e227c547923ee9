//! Upload constraints and the heuristics that infer them from a page.
//!
//! Extraction never fails.  Each rule either sets a field or leaves it
//! alone; page-text rules win over the input's own attributes for the
//! fields they set.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifact::extension_for_mime;
use crate::operation::OperationKind;

// ── Constraints ──────────────────────────────────────────────────────────────

/// Acceptance rules a target form is inferred to require.
///
/// `formats` holds lowercase, dot-prefixed extensions with no duplicates.
/// `max_size` is a byte count.  Serialized with camelCase keys, which is the
/// shape the processing service reads from the `constraints` form field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Constraints {
    pub max_size:   Option<u64>,
    pub formats:    Vec<String>,
    pub width:      Option<u32>,
    pub height:     Option<u32>,
    pub operations: Vec<OperationKind>,
}

impl Constraints {
    /// Constraints that only carry an explicit operation list, as used for
    /// manually requested operations.
    pub fn for_operations(operations: Vec<OperationKind>) -> Self {
        Self { operations, ..Self::default() }
    }

    pub fn has_format_rule(&self) -> bool { !self.formats.is_empty() }

    pub fn allows_extension(&self, ext: &str) -> bool {
        self.formats.iter().any(|f| f == ext)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn push_format(&mut self, ext: String) {
        if !ext.is_empty() && !self.formats.contains(&ext) {
            self.formats.push(ext);
        }
    }
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// Declared attributes of a file `<input>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInputAttrs {
    /// Raw `accept` attribute.
    pub accept:        Option<String>,
    /// Raw `data-max-size` attribute.
    pub data_max_size: Option<String>,
}

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:max\s*file\s*size|max\s*size|file\s*limit)[:\-\s]*(\d+(?:\.\d+)?)\s*(kb|mb|gb)")
        .expect("size pattern compiles")
});

static FORMATS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:accepted|allowed)\s*(?:formats|types)[:\-\s]*([a-z, ]+)")
        .expect("formats pattern compiles")
});

static DIMENSIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*x\s*(\d+)\s*(?:px)?").expect("dimensions pattern compiles")
});

/// Derive [`Constraints`] from an input's attributes and the page's visible
/// text.
pub fn extract_constraints(input: &FileInputAttrs, page_text: &str) -> Constraints {
    let mut c = Constraints::default();

    if let Some(accept) = &input.accept {
        for token in accept.split(',') {
            if let Some(ext) = normalize_accept_token(token) {
                c.push_format(ext);
            }
        }
    }

    if let Some(raw) = &input.data_max_size {
        c.max_size = raw.trim().parse::<u64>().ok();
    }

    let text = page_text.to_lowercase();

    if let Some(bytes) = scan_max_size(&text) {
        c.max_size = Some(bytes);
    }

    let scanned = scan_formats(&text);
    if !scanned.is_empty() {
        c.formats.clear();
        for ext in scanned {
            c.push_format(ext);
        }
    }

    if let Some((w, h)) = scan_dimensions(&text) {
        c.width = Some(w);
        c.height = Some(h);
    }

    debug!(
        max_size = ?c.max_size,
        formats = ?c.formats,
        width = ?c.width,
        height = ?c.height,
        "extracted constraints"
    );
    c
}

/// Turn one `accept` token into a dot-prefixed extension.
///
/// MIME wildcards (`image/*`) and MIME types with no known extension name no
/// single extension and are dropped.
fn normalize_accept_token(token: &str) -> Option<String> {
    let token = token.trim().to_ascii_lowercase();
    if token.is_empty() {
        return None;
    }
    if token.starts_with('.') {
        return Some(token);
    }
    if token.contains('/') {
        return extension_for_mime(&token).map(str::to_string);
    }
    Some(format!(".{token}"))
}

fn scan_max_size(text: &str) -> Option<u64> {
    let caps = SIZE_RE.captures(text)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let multiplier: f64 = match caps.get(2)?.as_str().to_ascii_lowercase().as_str() {
        "kb" => 1024.0,
        "mb" => 1024.0 * 1024.0,
        "gb" => 1024.0 * 1024.0 * 1024.0,
        _    => return None,
    };
    Some((value * multiplier).floor() as u64)
}

fn scan_formats(text: &str) -> Vec<String> {
    let Some(list) = FORMATS_RE.captures(text).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    list.as_str()
        .split(|ch: char| ch == ',' || ch.is_whitespace())
        .map(str::trim)
        .filter(|t| !t.is_empty() && *t != "and" && *t != "or")
        .map(|t| format!(".{t}"))
        .collect()
}

fn scan_dimensions(text: &str) -> Option<(u32, u32)> {
    let caps = DIMENSIONS_RE.captures(text)?;
    let w = caps.get(1)?.as_str().parse().ok()?;
    let h = caps.get(2)?.as_str().parse().ok()?;
    Some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(accept: Option<&str>, max: Option<&str>) -> FileInputAttrs {
        FileInputAttrs {
            accept:        accept.map(str::to_string),
            data_max_size: max.map(str::to_string),
        }
    }

    #[test]
    fn nothing_to_find() {
        let c = extract_constraints(&FileInputAttrs::default(), "Upload your résumé below.");
        assert_eq!(c, Constraints::default());
    }

    #[test]
    fn attributes_only() {
        let c = extract_constraints(&attrs(Some(" .PDF, image/png ,docx, image/*"), Some("2048")), "");
        assert_eq!(c.formats, vec![".pdf", ".png", ".docx"]);
        assert_eq!(c.max_size, Some(2048));
    }

    #[test]
    fn unparseable_max_size_attribute_is_ignored() {
        let c = extract_constraints(&attrs(None, Some("2 MB")), "");
        assert_eq!(c.max_size, None);
    }

    #[test]
    fn page_size_overrides_attribute() {
        let c = extract_constraints(&attrs(None, Some("100")), "Max file size: 2 MB per document");
        assert_eq!(c.max_size, Some(2 * 1024 * 1024));

        let c = extract_constraints(&FileInputAttrs::default(), "FILE LIMIT - 1.5mb");
        assert_eq!(c.max_size, Some(1_572_864));

        let c = extract_constraints(&FileInputAttrs::default(), "max size 500 KB");
        assert_eq!(c.max_size, Some(512_000));
    }

    #[test]
    fn page_formats_override_accept() {
        let c = extract_constraints(
            &attrs(Some(".gif"), None),
            "Accepted formats: JPG, PNG and PDF.\nOther text",
        );
        assert_eq!(c.formats, vec![".jpg", ".png", ".pdf"]);
    }

    #[test]
    fn allowed_types_phrase() {
        let c = extract_constraints(&FileInputAttrs::default(), "allowed types - pdf,doc");
        assert_eq!(c.formats, vec![".pdf", ".doc"]);
    }

    #[test]
    fn dimensions() {
        let c = extract_constraints(&FileInputAttrs::default(), "Photo must be 600 x 800px");
        assert_eq!((c.width, c.height), (Some(600), Some(800)));
    }

    #[test]
    fn oversized_dimension_is_skipped() {
        let c = extract_constraints(&FileInputAttrs::default(), "99999999999x2");
        assert_eq!((c.width, c.height), (None, None));
    }

    #[test]
    fn serializes_camel_case() {
        let c = Constraints {
            max_size: Some(1000),
            formats: vec![".png".into()],
            operations: vec![OperationKind::Convert, OperationKind::ImgCompressor],
            ..Constraints::default()
        };
        let json = c.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"maxSize":1000,"formats":[".png"],"width":null,"height":null,"operations":["convert","imgCompressor"]}"#
        );
        let partial: Constraints = serde_json::from_str(r#"{"maxSize":500}"#).unwrap();
        assert_eq!(partial.max_size, Some(500));
        assert!(partial.formats.is_empty());
    }
}
