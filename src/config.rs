use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::parser::Mode;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub project: Project,
    #[serde(default)]
    pub reports: Reports,
}

#[derive(Debug, Deserialize)]
pub struct Project {
    pub name: String,
}

/// Report path patterns per mode. Entries are glob patterns relative to the
/// directory the config file lives in.
#[derive(Debug, Default, Deserialize)]
pub struct Reports {
    #[serde(default)]
    pub coverage: Vec<String>,
    #[serde(default)]
    pub it_coverage: Vec<String>,
    #[serde(default)]
    pub overall_coverage: Vec<String>,
    #[serde(default)]
    pub unit_tests: Vec<String>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| "Failed to parse covx.toml")?;

        Ok(config)
    }

    pub fn patterns(&self, mode: Mode) -> &[String] {
        match mode {
            Mode::Coverage => &self.reports.coverage,
            Mode::ItCoverage => &self.reports.it_coverage,
            Mode::OverallCoverage => &self.reports.overall_coverage,
            Mode::UnitTest => &self.reports.unit_tests,
        }
    }

    pub fn has_reports(&self) -> bool {
        !self.reports.coverage.is_empty()
            || !self.reports.it_coverage.is_empty()
            || !self.reports.overall_coverage.is_empty()
            || !self.reports.unit_tests.is_empty()
    }
}
