//! Per-file coverage accumulation.
//!
//! One `CoverageBuilder` exists per (file, mode). It absorbs `lineToCover`
//! records from any number of report fragments under max-based merge rules, so
//! the final state is independent of the order the fragments arrive in.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use super::{Measure, Mode};

struct MetricKeys {
    lines_to_cover: &'static str,
    uncovered_lines: &'static str,
    line_hits_data: &'static str,
    conditions_to_cover: &'static str,
    uncovered_conditions: &'static str,
    conditions_by_line: &'static str,
    covered_conditions_by_line: &'static str,
}

static PLAIN_KEYS: MetricKeys = MetricKeys {
    lines_to_cover: "lines_to_cover",
    uncovered_lines: "uncovered_lines",
    line_hits_data: "coverage_line_hits_data",
    conditions_to_cover: "conditions_to_cover",
    uncovered_conditions: "uncovered_conditions",
    conditions_by_line: "conditions_by_line",
    covered_conditions_by_line: "covered_conditions_by_line",
};

static IT_KEYS: MetricKeys = MetricKeys {
    lines_to_cover: "it_lines_to_cover",
    uncovered_lines: "it_uncovered_lines",
    line_hits_data: "it_coverage_line_hits_data",
    conditions_to_cover: "it_conditions_to_cover",
    uncovered_conditions: "it_uncovered_conditions",
    conditions_by_line: "it_conditions_by_line",
    covered_conditions_by_line: "it_covered_conditions_by_line",
};

static OVERALL_KEYS: MetricKeys = MetricKeys {
    lines_to_cover: "overall_lines_to_cover",
    uncovered_lines: "overall_uncovered_lines",
    line_hits_data: "overall_coverage_line_hits_data",
    conditions_to_cover: "overall_conditions_to_cover",
    uncovered_conditions: "overall_uncovered_conditions",
    conditions_by_line: "overall_conditions_by_line",
    covered_conditions_by_line: "overall_covered_conditions_by_line",
};

/// The accumulation algorithm is mode-agnostic; modes only relabel the metric
/// keys written out at the end.
fn metric_keys(mode: Mode) -> &'static MetricKeys {
    match mode {
        Mode::ItCoverage => &IT_KEYS,
        Mode::OverallCoverage => &OVERALL_KEYS,
        Mode::Coverage | Mode::UnitTest => &PLAIN_KEYS,
    }
}

/// A later record declared a different branch count for a line that already
/// has one. The same line cannot change its branch topology between reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchMismatch {
    pub existing: u32,
    pub reported: u32,
}

#[derive(Debug, Default)]
pub struct CoverageBuilder {
    covered_lines: u32,
    conditions: u32,
    covered_conditions: u32,
    hits_by_line: BTreeMap<u32, u32>,
    conditions_by_line: BTreeMap<u32, u32>,
    covered_conditions_by_line: BTreeMap<u32, u32>,
}

impl CoverageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a hit count for a line. Repeated records for the same line keep
    /// the maximum, so a line never un-covers itself across merges.
    pub fn set_hits(&mut self, line: u32, hits: u32) {
        match self.hits_by_line.entry(line) {
            Entry::Occupied(mut entry) => {
                let old = *entry.get();
                entry.insert(old.max(hits));
                if old == 0 && hits > 0 {
                    self.covered_lines += 1;
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(hits);
                if hits > 0 {
                    self.covered_lines += 1;
                }
            }
        }
    }

    /// Records the branch count and covered-branch count for a line. Records
    /// with zero branches are ignored. The first record fixes the line's
    /// branch count; later records must agree on it, and their covered count
    /// merges as a monotonic max.
    pub fn set_conditions(
        &mut self,
        line: u32,
        conditions: u32,
        covered: u32,
    ) -> Result<(), BranchMismatch> {
        if conditions == 0 {
            return Ok(());
        }
        if let Some(&existing) = self.conditions_by_line.get(&line) {
            if existing != conditions {
                return Err(BranchMismatch {
                    existing,
                    reported: conditions,
                });
            }
            let old = self.covered_conditions_by_line[&line];
            let merged = old.max(covered);
            self.covered_conditions += merged - old;
            self.covered_conditions_by_line.insert(line, merged);
        } else {
            self.conditions += conditions;
            self.covered_conditions += covered;
            self.conditions_by_line.insert(line, conditions);
            self.covered_conditions_by_line.insert(line, covered);
        }
        Ok(())
    }

    pub fn lines_to_cover(&self) -> u32 {
        self.hits_by_line.len() as u32
    }

    pub fn covered_lines(&self) -> u32 {
        self.covered_lines
    }

    pub fn conditions(&self) -> u32 {
        self.conditions
    }

    pub fn covered_conditions(&self) -> u32 {
        self.covered_conditions
    }

    pub fn hits_by_line(&self) -> &BTreeMap<u32, u32> {
        &self.hits_by_line
    }

    pub fn conditions_by_line(&self) -> &BTreeMap<u32, u32> {
        &self.conditions_by_line
    }

    pub fn covered_conditions_by_line(&self) -> &BTreeMap<u32, u32> {
        &self.covered_conditions_by_line
    }

    /// Projects the accumulated state into measures. A file with no coverable
    /// lines produces no line measures at all, and a file with no branches
    /// produces no condition measures, rather than zeros.
    pub fn measures(&self, mode: Mode) -> Vec<Measure> {
        let keys = metric_keys(mode);
        let mut measures = Vec::new();
        if self.lines_to_cover() > 0 {
            measures.push(Measure::int(keys.lines_to_cover, self.lines_to_cover() as u64));
            measures.push(Measure::int(
                keys.uncovered_lines,
                (self.lines_to_cover() - self.covered_lines) as u64,
            ));
            measures.push(Measure::data(keys.line_hits_data, &self.hits_by_line));
        }
        if self.conditions > 0 {
            measures.push(Measure::int(keys.conditions_to_cover, self.conditions as u64));
            measures.push(Measure::int(
                keys.uncovered_conditions,
                (self.conditions - self.covered_conditions) as u64,
            ));
            measures.push(Measure::data(keys.conditions_by_line, &self.conditions_by_line));
            measures.push(Measure::data(
                keys.covered_conditions_by_line,
                &self.covered_conditions_by_line,
            ));
        }
        measures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::MeasureValue;

    fn find<'a>(measures: &'a [Measure], metric: &str) -> &'a MeasureValue {
        &measures
            .iter()
            .find(|m| m.metric == metric)
            .unwrap_or_else(|| panic!("no measure {}", metric))
            .value
    }

    #[test]
    fn test_no_measures_without_values() {
        let builder = CoverageBuilder::new();
        assert!(builder.measures(Mode::Coverage).is_empty());
    }

    #[test]
    fn test_hits_by_line_data() {
        let mut builder = CoverageBuilder::new();
        builder.set_hits(1, 0);
        builder.set_hits(1, 0); // equal set
        builder.set_hits(2, 3);
        builder.set_hits(2, 0); // lower value is ignored
        builder.set_hits(4, 2);
        let measures = builder.measures(Mode::Coverage);
        assert_eq!(
            find(&measures, "coverage_line_hits_data"),
            &MeasureValue::Data("1=0;2=3;4=2".to_string())
        );
        assert_eq!(builder.covered_lines(), 2);
    }

    #[test]
    fn test_uncovered_lines() {
        let mut builder = CoverageBuilder::new();
        builder.set_hits(1, 0);
        builder.set_hits(2, 3);
        builder.set_hits(3, 0);
        let measures = builder.measures(Mode::Coverage);
        assert_eq!(find(&measures, "uncovered_lines"), &MeasureValue::Int(2));
        assert_eq!(find(&measures, "lines_to_cover"), &MeasureValue::Int(3));
    }

    #[test]
    fn test_it_mode_relabels_metrics() {
        let mut builder = CoverageBuilder::new();
        builder.set_hits(1, 0);
        builder.set_hits(2, 3);
        builder.set_hits(3, 0);
        let measures = builder.measures(Mode::ItCoverage);
        assert_eq!(
            find(&measures, "it_coverage_line_hits_data"),
            &MeasureValue::Data("1=0;2=3;3=0".to_string())
        );
        assert_eq!(find(&measures, "it_uncovered_lines"), &MeasureValue::Int(2));
        assert_eq!(find(&measures, "it_lines_to_cover"), &MeasureValue::Int(3));
    }

    #[test]
    fn test_overall_mode_relabels_metrics() {
        let mut builder = CoverageBuilder::new();
        builder.set_hits(1, 1);
        let measures = builder.measures(Mode::OverallCoverage);
        assert_eq!(find(&measures, "overall_lines_to_cover"), &MeasureValue::Int(1));
        assert_eq!(find(&measures, "overall_uncovered_lines"), &MeasureValue::Int(0));
    }

    #[test]
    fn test_conditions_by_line_data() {
        let mut builder = CoverageBuilder::new();
        builder.set_conditions(1, 2, 2).unwrap();
        builder.set_conditions(2, 1, 0).unwrap();
        let measures = builder.measures(Mode::Coverage);
        assert_eq!(
            find(&measures, "conditions_by_line"),
            &MeasureValue::Data("1=2;2=1".to_string())
        );
        assert_eq!(
            find(&measures, "covered_conditions_by_line"),
            &MeasureValue::Data("1=2;2=0".to_string())
        );
        assert_eq!(find(&measures, "conditions_to_cover"), &MeasureValue::Int(3));
    }

    #[test]
    fn test_uncovered_conditions() {
        let mut builder = CoverageBuilder::new();
        builder.set_conditions(1, 2, 2).unwrap();
        builder.set_conditions(2, 1, 0).unwrap();
        builder.set_conditions(3, 3, 1).unwrap();
        let measures = builder.measures(Mode::Coverage);
        assert_eq!(find(&measures, "uncovered_conditions"), &MeasureValue::Int(3));
    }

    #[test]
    fn test_zero_conditions_are_ignored() {
        let mut builder = CoverageBuilder::new();
        builder.set_conditions(1, 0, 0).unwrap();
        builder.set_conditions(2, 1, 0).unwrap();
        let measures = builder.measures(Mode::Coverage);
        assert_eq!(
            find(&measures, "conditions_by_line"),
            &MeasureValue::Data("2=1".to_string())
        );
        assert_eq!(
            find(&measures, "covered_conditions_by_line"),
            &MeasureValue::Data("2=0".to_string())
        );
    }

    #[test]
    fn test_merge_duplicated_hits() {
        let mut builder = CoverageBuilder::new();
        builder.set_hits(2, 3);
        builder.set_hits(2, 5); // merges to the max
        assert_eq!(builder.lines_to_cover(), 1);
        assert_eq!(builder.covered_lines(), 1);
        assert_eq!(builder.hits_by_line()[&2], 5);
        builder.set_hits(3, 0);
        assert_eq!(builder.lines_to_cover(), 2);
        assert_eq!(builder.covered_lines(), 1);
        builder.set_hits(3, 1);
        assert_eq!(builder.lines_to_cover(), 2);
        assert_eq!(builder.covered_lines(), 2);
        assert_eq!(builder.hits_by_line()[&3], 1);
    }

    #[test]
    fn test_branch_count_mismatch() {
        let mut builder = CoverageBuilder::new();
        builder.set_conditions(1, 3, 2).unwrap();
        assert_eq!(
            builder.set_conditions(1, 1, 2),
            Err(BranchMismatch {
                existing: 3,
                reported: 1,
            })
        );
    }

    #[test]
    fn test_merge_repeated_conditions() {
        let mut builder = CoverageBuilder::new();
        builder.set_conditions(1, 3, 1).unwrap();
        builder.set_conditions(1, 3, 2).unwrap();
        assert_eq!(builder.conditions(), 3);
        assert_eq!(builder.covered_conditions(), 2);
        assert_eq!(builder.conditions_by_line()[&1], 3);
        assert_eq!(builder.covered_conditions_by_line()[&1], 2);
    }

    #[test]
    fn test_covered_conditions_never_decrease() {
        let mut builder = CoverageBuilder::new();
        builder.set_conditions(7, 2, 2).unwrap();
        builder.set_conditions(7, 2, 1).unwrap();
        assert_eq!(builder.covered_conditions(), 2);
        assert_eq!(builder.covered_conditions_by_line()[&7], 2);
    }

    #[test]
    fn test_covered_never_exceeds_total() {
        let mut builder = CoverageBuilder::new();
        builder.set_hits(1, 1);
        builder.set_hits(2, 0);
        builder.set_conditions(1, 4, 3).unwrap();
        builder.set_conditions(1, 4, 2).unwrap();
        assert!(builder.covered_lines() <= builder.lines_to_cover());
        assert!(builder.covered_conditions() <= builder.conditions());
    }
}
