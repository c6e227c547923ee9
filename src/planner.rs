//! Decide which remote operations a file needs to satisfy its constraints.

use tracing::debug;

use crate::artifact::FileMeta;
use crate::constraints::Constraints;
use crate::operation::OperationKind;

/// Result of planning one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub operations:     Vec<OperationKind>,
    /// Target dimensions, only for images.  No operation serves them; they
    /// are carried for the adapter to report.
    pub dimension_hint: Option<(Option<u32>, Option<u32>)>,
}

impl Plan {
    pub fn is_noop(&self) -> bool { self.operations.is_empty() }
}

/// Plan the ordered operation list for `file` under `constraints`.
///
/// Conversion is always planned before any size-driven operation because
/// conversion changes the byte size.
pub fn plan(file: FileMeta<'_>, constraints: &Constraints) -> Plan {
    let mut operations = Vec::new();

    let ext = file.extension();
    if constraints.has_format_rule() && !constraints.allows_extension(&ext) {
        debug!(file = file.name, ext = %ext, "format not accepted; conversion required");
        operations.push(OperationKind::Convert);
    }

    if let Some(max) = constraints.max_size {
        if file.size > max {
            let op = if file.is_image() { OperationKind::ImgCompressor } else { OperationKind::Compress };
            debug!(file = file.name, size = file.size, max, op = %op, "file exceeds max size");
            operations.push(op);
        }
    }

    let dimension_hint = if file.is_image() && (constraints.width.is_some() || constraints.height.is_some()) {
        Some((constraints.width, constraints.height))
    } else {
        None
    };

    Plan { operations, dimension_hint }
}

/// Copy of `constraints` with `operations` populated from [`plan`].
pub fn plan_into(file: FileMeta<'_>, constraints: &Constraints) -> Constraints {
    let planned = plan(file, constraints);
    Constraints { operations: planned.operations, ..constraints.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta<'a>(name: &'a str, size: u64, mime: &'a str) -> FileMeta<'a> {
        FileMeta { name, size, mime }
    }

    #[test]
    fn convert_then_image_compress() {
        let c = Constraints { formats: vec![".png".into()], max_size: Some(1000), ..Constraints::default() };
        let p = plan(meta("photo.jpg", 2000, "image/jpeg"), &c);
        assert_eq!(p.operations, vec![OperationKind::Convert, OperationKind::ImgCompressor]);
    }

    #[test]
    fn noop_without_rules() {
        let c = Constraints::default();
        for m in [meta("a.pdf", 10, "application/pdf"), meta("b.jpg", u64::MAX, "image/jpeg"), meta("c", 0, "")] {
            assert!(plan(m, &c).is_noop());
        }
    }

    #[test]
    fn document_over_limit_compresses() {
        let c = Constraints { formats: vec![".pdf".into()], max_size: Some(100), ..Constraints::default() };
        let p = plan(meta("Thesis.PDF", 101, "application/pdf"), &c);
        assert_eq!(p.operations, vec![OperationKind::Compress]);
    }

    #[test]
    fn exact_limit_is_accepted() {
        let c = Constraints { max_size: Some(100), ..Constraints::default() };
        assert!(plan(meta("a.pdf", 100, "application/pdf"), &c).is_noop());
    }

    #[test]
    fn dimensions_ignored_for_documents() {
        let c = Constraints { width: Some(600), height: Some(800), ..Constraints::default() };
        let doc = plan(meta("a.pdf", 1, "application/pdf"), &c);
        assert!(doc.is_noop());
        assert_eq!(doc.dimension_hint, None);

        let img = plan(meta("a.png", 1, "image/png"), &c);
        assert!(img.is_noop());
        assert_eq!(img.dimension_hint, Some((Some(600), Some(800))));
    }

    #[test]
    fn plan_into_keeps_rules() {
        let c = Constraints { formats: vec![".png".into()], ..Constraints::default() };
        let planned = plan_into(meta("a.gif", 1, "image/gif"), &c);
        assert_eq!(planned.formats, c.formats);
        assert_eq!(planned.operations, vec![OperationKind::Convert]);
    }
}
