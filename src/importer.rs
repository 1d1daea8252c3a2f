//! Drives the report parser over the report sources of one mode.
//!
//! One call handles one mode: sources are parsed in order into a shared set
//! of per-file builders, so overlapping reports merge; the first violation
//! aborts the whole pass with the source path folded into the error. Only
//! after every source parsed cleanly are the measures pushed to the sinks.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::parser::{Mode, ReportError, ReportParser};
use crate::resolver::ResourceResolver;
use crate::sink::{MeasureSink, TestPlanSink};

#[derive(Debug, Error)]
pub enum ImportError {
    /// A requested report file does not exist. Reported, never skipped.
    #[error("cannot find {} report to parse: {}", .mode, .path.display())]
    SourceNotFound { mode: Mode, path: PathBuf },

    #[error("cannot read {} report {}: {}", .mode, .path.display(), .error)]
    Io {
        mode: Mode,
        path: PathBuf,
        error: io::Error,
    },

    #[error("cannot parse {} report {}: {}", .mode, .path.display(), .error)]
    Report {
        mode: Mode,
        path: PathBuf,
        error: ReportError,
    },
}

impl ImportError {
    /// The report file the error originates from.
    pub fn path(&self) -> &Path {
        match self {
            ImportError::SourceNotFound { path, .. }
            | ImportError::Io { path, .. }
            | ImportError::Report { path, .. } => path,
        }
    }
}

/// Outcome counters of one mode pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub matched_files: usize,
    pub unknown_files: u32,
    pub unknown_file_sample: Vec<String>,
}

/// Parses and aggregates all report sources of one mode, in order, and pushes
/// the finalized measures into the sinks.
pub fn import_reports(
    mode: Mode,
    sources: &[PathBuf],
    resolver: &dyn ResourceResolver,
    measures: &mut dyn MeasureSink,
    test_plan: Option<&mut dyn TestPlanSink>,
) -> Result<ImportStats, ImportError> {
    let mut parser = ReportParser::new(mode, resolver);
    for path in sources {
        if !path.exists() {
            return Err(ImportError::SourceNotFound {
                mode,
                path: path.clone(),
            });
        }
        let text = fs::read_to_string(path).map_err(|error| ImportError::Io {
            mode,
            path: path.clone(),
            error,
        })?;
        parser
            .parse_str(&text)
            .map_err(|error| ImportError::Report {
                mode,
                path: path.clone(),
                error,
            })?;
    }
    parser.save_measures(measures, test_plan);
    Ok(ImportStats {
        matched_files: parser.matched_files(),
        unknown_files: parser.unknown_files(),
        unknown_file_sample: parser.first_unknown_files().to_vec(),
    })
}
