//! Report parsing and validation.
//!
//! Implements the two report grammars over the streaming cursor:
//!
//! ```text
//! coverage[version] -> file[path]* -> lineToCover[lineNumber, covered,
//!                                     branchesToCover?, coveredBranches?]*
//! unitTest[version] -> file[path]* -> testCase[name, duration,
//!                                     (failure|error|skipped)[message]?]*
//! ```
//!
//! A `ReportParser` keeps one builder per resolved file and can parse any
//! number of report documents for its mode; overlapping fragments merge under
//! the builders' rules. The first violation aborts the pass.

mod cursor;
mod error;

pub use error::ReportError;

use std::collections::BTreeMap;
use std::fmt;

use crate::aggregate::coverage::CoverageBuilder;
use crate::aggregate::unit_test::{TestCaseData, TestStatus, UnitTestBuilder};
use crate::resolver::ResourceResolver;
use crate::sink::{MeasureSink, TestPlanSink};
use cursor::{Element, Node, ReportCursor};

const MAX_STORED_UNKNOWN_FILE_PATHS: usize = 5;

/// Which report family is being parsed. Coverage-family modes share one
/// grammar and one accumulation algorithm; they differ only in the metric
/// keys written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Coverage,
    ItCoverage,
    OverallCoverage,
    UnitTest,
}

impl Mode {
    pub fn root_element(&self) -> &'static str {
        match self {
            Mode::UnitTest => "unitTest",
            _ => "coverage",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Mode::Coverage => "coverage",
            Mode::ItCoverage => "IT coverage",
            Mode::OverallCoverage => "overall coverage",
            Mode::UnitTest => "unit test",
        };
        f.write_str(label)
    }
}

/// Parses report documents for one mode, accumulating per-file builders and
/// unknown-file diagnostics across documents.
pub struct ReportParser<'a> {
    mode: Mode,
    resolver: &'a dyn ResourceResolver,
    coverage: BTreeMap<String, CoverageBuilder>,
    tests: BTreeMap<String, UnitTestBuilder>,
    unknown_files: u32,
    first_unknown_files: Vec<String>,
}

impl<'a> ReportParser<'a> {
    pub fn new(mode: Mode, resolver: &'a dyn ResourceResolver) -> Self {
        ReportParser {
            mode,
            resolver,
            coverage: BTreeMap::new(),
            tests: BTreeMap::new(),
            unknown_files: 0,
            first_unknown_files: Vec::new(),
        }
    }

    /// Parses one report document, merging its records into the per-file
    /// builders. Can be called once per report source of the mode.
    pub fn parse_str(&mut self, text: &str) -> Result<(), ReportError> {
        let mut cursor = ReportCursor::new(text);
        let root = match cursor.next_node()? {
            Node::Open(el) => el,
            _ => {
                return Err(ReportError::MalformedDocument {
                    position: 0,
                    message: "no root element".to_string(),
                })
            }
        };
        check_element_name(&root, self.mode.root_element())?;
        let version = mandatory_attribute(&root, "version")?;
        if version != "1" {
            return Err(ReportError::StructuralViolation {
                line: root.line,
                message: format!(
                    "Unknown report version \"{}\". This parser only handles version 1",
                    version
                ),
            });
        }
        if root.self_closing {
            return Ok(());
        }
        loop {
            match cursor.next_node()? {
                Node::Open(el) => self.parse_file(&mut cursor, el)?,
                Node::Close(_) => return Ok(()),
                Node::Eof => {
                    return Err(ReportError::MalformedDocument {
                        position: text.len(),
                        message: "unexpected end of document".to_string(),
                    })
                }
            }
        }
    }

    fn parse_file(&mut self, cursor: &mut ReportCursor, el: Element) -> Result<(), ReportError> {
        check_element_name(&el, "file")?;
        let path = non_empty_attribute(&el, "path")?.to_string();
        let Some(key) = self.resolver.resolve(&path) else {
            self.unknown_files += 1;
            if self.first_unknown_files.len() < MAX_STORED_UNKNOWN_FILE_PATHS {
                self.first_unknown_files.push(path);
            }
            // unknown files are counted, their records are not even validated
            if !el.self_closing {
                cursor.skip_subtree()?;
            }
            return Ok(());
        };
        if self.mode == Mode::UnitTest {
            self.parse_test_cases(cursor, &el, &path, key)
        } else {
            self.parse_lines_to_cover(cursor, &el, &path, key)
        }
    }

    fn parse_lines_to_cover(
        &mut self,
        cursor: &mut ReportCursor,
        file_el: &Element,
        path: &str,
        key: String,
    ) -> Result<(), ReportError> {
        let builder = self.coverage.entry(key).or_default();
        if file_el.self_closing {
            return Ok(());
        }
        loop {
            let el = match cursor.next_node()? {
                Node::Open(el) => el,
                Node::Close(_) => return Ok(()),
                Node::Eof => {
                    return Err(ReportError::MalformedDocument {
                        position: 0,
                        message: "unexpected end of document".to_string(),
                    })
                }
            };
            check_element_name(&el, "lineToCover")?;
            let line_number = int_attribute(&el, "lineNumber", 1)?;
            let covered = bool_attribute(&el, "covered")?;
            builder.set_hits(line_number, u32::from(covered));

            if let Some(raw) = el.attr("branchesToCover") {
                let branches = parse_int(raw, &el, "branchesToCover", 0)?;
                let covered_branches = match el.attr("coveredBranches") {
                    Some(raw) => parse_int(raw, &el, "coveredBranches", 0)?,
                    None => 0,
                };
                if covered_branches > branches {
                    return Err(ReportError::ValueRangeViolation {
                        line: el.line,
                        message: "\"coveredBranches\" should not be greater than \
                                  \"branchesToCover\""
                            .to_string(),
                    });
                }
                builder
                    .set_conditions(line_number, branches, covered_branches)
                    .map_err(|conflict| ReportError::MergeConflict {
                        line: el.line,
                        message: format!(
                            "Line {} of file \"{}\" was reported with {} branches \
                             and cannot change to {}",
                            line_number, path, conflict.existing, conflict.reported
                        ),
                    })?;
            }
            // the grammar has no children here; anything nested is ignored
            if !el.self_closing {
                cursor.skip_subtree()?;
            }
        }
    }

    fn parse_test_cases(
        &mut self,
        cursor: &mut ReportCursor,
        file_el: &Element,
        path: &str,
        key: String,
    ) -> Result<(), ReportError> {
        let builder = self.tests.entry(key).or_default();
        if file_el.self_closing {
            return Ok(());
        }
        loop {
            let el = match cursor.next_node()? {
                Node::Open(el) => el,
                Node::Close(_) => return Ok(()),
                Node::Eof => {
                    return Err(ReportError::MalformedDocument {
                        position: 0,
                        message: "unexpected end of document".to_string(),
                    })
                }
            };
            check_element_name(&el, "testCase")?;
            let name = non_empty_attribute(&el, "name")?.to_string();
            let duration_ms = u64::from(int_attribute(&el, "duration", 0)?);

            let mut status = TestStatus::Ok;
            let mut message = None;
            let mut stack_trace = None;
            if !el.self_closing {
                loop {
                    let child = match cursor.next_node()? {
                        Node::Open(child) => child,
                        Node::Close(_) => break,
                        Node::Eof => {
                            return Err(ReportError::MalformedDocument {
                                position: 0,
                                message: "unexpected end of document".to_string(),
                            })
                        }
                    };
                    let child_status = match child.name.as_str() {
                        "failure" => TestStatus::Failure,
                        "error" => TestStatus::Error,
                        "skipped" => TestStatus::Skipped,
                        other => {
                            return Err(ReportError::StructuralViolation {
                                line: child.line,
                                message: format!(
                                    "Unknown XML node, expected \"failure\", \"error\" or \
                                     \"skipped\" but got \"{}\"",
                                    other
                                ),
                            })
                        }
                    };
                    if status != TestStatus::Ok {
                        return Err(ReportError::StructuralViolation {
                            line: child.line,
                            message: format!(
                                "Element \"testCase\" allows at most one of \"failure\", \
                                 \"error\" or \"skipped\" but got a second one (\"{}\")",
                                child.name
                            ),
                        });
                    }
                    status = child_status;
                    message = Some(mandatory_attribute(&child, "message")?.to_string());
                    if !child.self_closing {
                        let text = cursor.collect_text()?;
                        if !text.is_empty() {
                            stack_trace = Some(text);
                        }
                    }
                }
            }
            builder
                .add_test_case(TestCaseData {
                    name,
                    status,
                    duration_ms,
                    message,
                    stack_trace,
                })
                .map_err(|duplicate| ReportError::MergeConflict {
                    line: el.line,
                    message: format!(
                        "Test case \"{}\" cannot be reported twice for the same file \"{}\"",
                        duplicate.name, path
                    ),
                })?;
        }
    }

    /// Pushes every builder's measures into the sink, and every test case
    /// into the test plan. Call once, after all sources parsed cleanly.
    pub fn save_measures(
        &self,
        measures: &mut dyn MeasureSink,
        mut test_plan: Option<&mut dyn TestPlanSink>,
    ) {
        for (file, builder) in &self.coverage {
            for measure in builder.measures(self.mode) {
                measures.save(file, measure);
            }
        }
        for (file, builder) in &self.tests {
            for measure in builder.measures() {
                measures.save(file, measure);
            }
            if let Some(plan) = test_plan.as_deref_mut() {
                for case in builder.test_cases() {
                    plan.add_test_case(file, case);
                }
            }
        }
    }

    /// Distinct project files the reports contributed data for.
    pub fn matched_files(&self) -> usize {
        self.coverage.len() + self.tests.len()
    }

    /// How many file references could not be resolved, counted per reference.
    pub fn unknown_files(&self) -> u32 {
        self.unknown_files
    }

    /// Capped sample of unresolvable paths, for diagnostics.
    pub fn first_unknown_files(&self) -> &[String] {
        &self.first_unknown_files
    }
}

fn check_element_name(el: &Element, expected: &str) -> Result<(), ReportError> {
    if el.name != expected {
        return Err(ReportError::StructuralViolation {
            line: el.line,
            message: format!(
                "Unknown XML node, expected \"{}\" but got \"{}\"",
                expected, el.name
            ),
        });
    }
    Ok(())
}

fn mandatory_attribute<'e>(el: &'e Element, name: &str) -> Result<&'e str, ReportError> {
    el.attr(name).ok_or_else(|| ReportError::StructuralViolation {
        line: el.line,
        message: format!(
            "Missing attribute \"{}\" in element \"{}\"",
            name, el.name
        ),
    })
}

fn non_empty_attribute<'e>(el: &'e Element, name: &str) -> Result<&'e str, ReportError> {
    let value = mandatory_attribute(el, name)?;
    if value.is_empty() {
        return Err(ReportError::StructuralViolation {
            line: el.line,
            message: format!(
                "Empty value for attribute \"{}\" in element \"{}\"",
                name, el.name
            ),
        });
    }
    Ok(value)
}

fn int_attribute(el: &Element, name: &str, minimum: u32) -> Result<u32, ReportError> {
    let raw = mandatory_attribute(el, name)?;
    parse_int(raw, el, name, minimum)
}

fn parse_int(raw: &str, el: &Element, name: &str, minimum: u32) -> Result<u32, ReportError> {
    let value: i64 = raw.parse().map_err(|_| ReportError::ValueRangeViolation {
        line: el.line,
        message: format!(
            "Expected integer value for attribute \"{}\" but got \"{}\"",
            name, raw
        ),
    })?;
    if value < i64::from(minimum) {
        return Err(ReportError::ValueRangeViolation {
            line: el.line,
            message: format!(
                "Value of attribute \"{}\" is \"{}\" but it should be greater than \
                 or equal to {}",
                name, value, minimum
            ),
        });
    }
    u32::try_from(value).map_err(|_| ReportError::ValueRangeViolation {
        line: el.line,
        message: format!(
            "Value of attribute \"{}\" is \"{}\" but it is too large",
            name, value
        ),
    })
}

fn bool_attribute(el: &Element, name: &str) -> Result<bool, ReportError> {
    let raw = mandatory_attribute(el, name)?;
    if raw.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(ReportError::ValueRangeViolation {
            line: el.line,
            message: format!(
                "Expected boolean value for attribute \"{}\" but got \"{}\"",
                name, raw
            ),
        })
    }
}
