//! Output boundaries for aggregated data.
//!
//! The core never persists anything itself; finalized measures and test cases
//! are pushed through these traits. The in-memory implementations back the
//! CLI output and the JSON export, and double as fakes in tests.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::{Measure, MeasureValue, TestCaseData};

/// Receives the finalized per-file measures.
pub trait MeasureSink {
    fn save(&mut self, file: &str, measure: Measure);
}

/// Receives individual test cases after a clean unit-test pass.
pub trait TestPlanSink {
    fn add_test_case(&mut self, file: &str, case: &TestCaseData);
}

/// Collects measures in memory, keyed by file.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct MemoryMeasureSink {
    pub by_file: BTreeMap<String, Vec<Measure>>,
}

impl MemoryMeasureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up one metric value for one file.
    pub fn value(&self, file: &str, metric: &str) -> Option<&MeasureValue> {
        self.by_file
            .get(file)?
            .iter()
            .find(|m| m.metric == metric)
            .map(|m| &m.value)
    }
}

impl MeasureSink for MemoryMeasureSink {
    fn save(&mut self, file: &str, measure: Measure) {
        self.by_file.entry(file.to_string()).or_default().push(measure);
    }
}

/// Collects test cases in memory, keyed by file, in report order.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct MemoryTestPlan {
    pub by_file: BTreeMap<String, Vec<TestCaseData>>,
}

impl MemoryTestPlan {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TestPlanSink for MemoryTestPlan {
    fn add_test_case(&mut self, file: &str, case: &TestCaseData) {
        self.by_file
            .entry(file.to_string())
            .or_default()
            .push(case.clone());
    }
}
