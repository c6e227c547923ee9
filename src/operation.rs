//! Remote operation identities.
//!
//! Each [`OperationKind`] names one endpoint on the processing service and
//! fixes how the executor treats that endpoint's response.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    #[serde(rename = "convert")]
    Convert,
    #[serde(rename = "compress")]
    Compress,
    #[serde(rename = "imgCompressor")]
    ImgCompressor,
    #[serde(rename = "split")]
    Split,
    #[serde(rename = "merge")]
    Merge,
}

/// What the executor does with a successful response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePolicy {
    /// Body is a finished PDF; stop the run without decrypting.
    FinalPdf,
    /// Body is an envelope, unless the service declares an archive type.
    Envelope,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Convert,
        OperationKind::Compress,
        OperationKind::ImgCompressor,
        OperationKind::Split,
        OperationKind::Merge,
    ];

    /// Endpoint path segment and wire name.
    pub fn name(self) -> &'static str {
        match self {
            OperationKind::Convert       => "convert",
            OperationKind::Compress      => "compress",
            OperationKind::ImgCompressor => "imgCompressor",
            OperationKind::Split         => "split",
            OperationKind::Merge         => "merge",
        }
    }

    pub fn endpoint(self) -> String {
        format!("/{}", self.name())
    }

    pub fn response_policy(self) -> ResponsePolicy {
        match self {
            OperationKind::Compress => ResponsePolicy::FinalPdf,
            _                       => ResponsePolicy::Envelope,
        }
    }

    /// Whether the operation takes one file.  `merge` takes several and has
    /// its own request shape.
    pub fn is_single_file(self) -> bool {
        self != OperationKind::Merge
    }

    /// Map an explicitly requested operation to the endpoint that serves it
    /// for a file of type `mime`.  Compression of images goes to the image
    /// compressor; everything else is passed through.
    pub fn resolve_manual(self, mime: &str) -> Self {
        match self {
            OperationKind::Compress if mime.starts_with("image/") => OperationKind::ImgCompressor,
            other => other,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown operation '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        assert_eq!(OperationKind::ImgCompressor.endpoint(), "/imgCompressor");
        assert_eq!(serde_json::to_string(&OperationKind::ImgCompressor).unwrap(), "\"imgCompressor\"");
        assert_eq!("IMGCOMPRESSOR".parse::<OperationKind>().unwrap(), OperationKind::ImgCompressor);
        assert!("resize".parse::<OperationKind>().is_err());
    }

    #[test]
    fn manual_compress_routes_images() {
        assert_eq!(OperationKind::Compress.resolve_manual("image/png"), OperationKind::ImgCompressor);
        assert_eq!(OperationKind::Compress.resolve_manual("application/pdf"), OperationKind::Compress);
        assert_eq!(OperationKind::Split.resolve_manual("image/png"), OperationKind::Split);
    }

    #[test]
    fn merge_is_the_only_multi_file_operation() {
        let single: Vec<_> = OperationKind::ALL.into_iter().filter(|op| op.is_single_file()).collect();
        assert_eq!(single.len(), 4);
        assert!(!OperationKind::Merge.is_single_file());
    }

    #[test]
    fn only_compress_is_final() {
        for op in OperationKind::ALL {
            let expected = if op == OperationKind::Compress { ResponsePolicy::FinalPdf } else { ResponsePolicy::Envelope };
            assert_eq!(op.response_policy(), expected);
        }
    }
}
