//! Report validation error taxonomy.

use thiserror::Error;

/// A violation found while parsing a single report document.
///
/// None of these are recoverable: the first violation aborts the whole
/// report-mode pass. Every variant except `MalformedDocument` carries the
/// 1-based line number of the offending record.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The byte stream is not well-formed XML. Carries the byte offset the
    /// reader had consumed, never an invented line number.
    #[error("malformed XML at byte {position}: {message}")]
    MalformedDocument { position: usize, message: String },

    /// Wrong element name or missing mandatory attribute.
    #[error("error at line {line}: {message}")]
    StructuralViolation { line: u32, message: String },

    /// Non-numeric or out-of-range attribute value.
    #[error("error at line {line}: {message}")]
    ValueRangeViolation { line: u32, message: String },

    /// A later report contradicts an earlier one for the same file.
    #[error("error at line {line}: {message}")]
    MergeConflict { line: u32, message: String },
}

impl ReportError {
    /// Line number of the offending record, when one is known.
    pub fn line(&self) -> Option<u32> {
        match self {
            ReportError::MalformedDocument { .. } => None,
            ReportError::StructuralViolation { line, .. }
            | ReportError::ValueRangeViolation { line, .. }
            | ReportError::MergeConflict { line, .. } => Some(*line),
        }
    }
}
