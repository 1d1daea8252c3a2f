//! Per-file measure aggregation.
//!
//! Provides:
//! - Coverage accumulation with max-based merge semantics
//! - Unit-test result accumulation with duplicate detection
//! - Projection of accumulated state into named measures

pub mod coverage;

pub use crate::parser::Mode;
pub use coverage::{BranchMismatch, CoverageBuilder};
pub use unit_test::{DuplicateTest, TestCaseData, TestStatus, UnitTestBuilder};

use std::collections::BTreeMap;

use serde::Serialize;

/// A single named metric value computed for one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measure {
    pub metric: &'static str,
    pub value: MeasureValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MeasureValue {
    Int(u64),
    Percent(f64),
    /// Per-line data in `line=value;line=value` form, ascending by line.
    Data(String),
}

impl Measure {
    pub fn int(metric: &'static str, value: u64) -> Self {
        Measure {
            metric,
            value: MeasureValue::Int(value),
        }
    }

    pub fn percent(metric: &'static str, value: f64) -> Self {
        Measure {
            metric,
            value: MeasureValue::Percent(value),
        }
    }

    pub fn data(metric: &'static str, by_line: &BTreeMap<u32, u32>) -> Self {
        Measure {
            metric,
            value: MeasureValue::Data(key_value_format(by_line)),
        }
    }
}

fn key_value_format(by_line: &BTreeMap<u32, u32>) -> String {
    let mut out = String::new();
    for (line, value) in by_line {
        if !out.is_empty() {
            out.push(';');
        }
        out.push_str(&format!("{}={}", line, value));
    }
    out
}
