use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use covx::config::Config;
use covx::{
    import_reports, AcceptAllResolver, ImportStats, Measure, MeasureValue, MemoryMeasureSink,
    MemoryTestPlan, Mode, ProjectResolver, TestCaseData,
};

const CONFIG_FILE: &str = "covx.toml";

const ALL_MODES: [Mode; 4] = [
    Mode::Coverage,
    Mode::ItCoverage,
    Mode::OverallCoverage,
    Mode::UnitTest,
];

#[derive(Parser)]
#[command(name = "covx")]
#[command(about = "Imports generic coverage and test reports into per-file metrics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import all reports configured in covx.toml
    Run {
        /// Path to config file (default: covx.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write the aggregated measures to a JSON file
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Import report files for a single mode
    Import {
        /// Report mode
        #[arg(short, long, value_enum, default_value = "coverage")]
        mode: ModeArg,

        /// Report files to parse, in order
        #[arg(required = true)]
        reports: Vec<PathBuf>,

        /// Project base directory used to resolve file paths
        #[arg(long, default_value = ".")]
        base_dir: PathBuf,

        /// Write the aggregated measures to a JSON file
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Validate report files without resolving them against a project
    Check {
        /// Report mode
        #[arg(short, long, value_enum, default_value = "coverage")]
        mode: ModeArg,

        /// Report files to validate
        #[arg(required = true)]
        reports: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Coverage,
    ItCoverage,
    OverallCoverage,
    UnitTest,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Mode {
        match arg {
            ModeArg::Coverage => Mode::Coverage,
            ModeArg::ItCoverage => Mode::ItCoverage,
            ModeArg::OverallCoverage => Mode::OverallCoverage,
            ModeArg::UnitTest => Mode::UnitTest,
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, json } => cmd_run(config, json),
        Commands::Import {
            mode,
            reports,
            base_dir,
            json,
        } => cmd_import(mode.into(), reports, &base_dir, json),
        Commands::Check { mode, reports } => cmd_check(mode.into(), reports),
    }
}

fn cmd_run(config_path: Option<PathBuf>, json: Option<PathBuf>) -> Result<()> {
    let config_path = config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let config_path = std::fs::canonicalize(&config_path)
        .with_context(|| format!("Could not find config file: {}", config_path.display()))?;

    let base_dir = config_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::load(&config_path)
        .with_context(|| format!("Could not load {}", config_path.display()))?;

    if !config.has_reports() {
        anyhow::bail!("No report paths configured in {}", config_path.display());
    }

    println!("\n{} {}\n", "📥".cyan(), config.project.name.bold());

    let resolver = ProjectResolver::new(&base_dir);
    let mut sink = MemoryMeasureSink::new();
    let mut plan = MemoryTestPlan::new();
    let mut modes = Vec::new();

    for mode in ALL_MODES {
        let sources = expand_patterns(config.patterns(mode), &base_dir)?;
        if sources.is_empty() {
            continue;
        }
        let stats = import_mode(mode, &sources, &resolver, &mut sink, &mut plan)?;
        modes.push((mode, stats));
    }

    print_file_summaries(&sink, &plan);

    if let Some(path) = json {
        write_json(&path, &config.project.name, &modes, &sink, &plan)?;
    }

    Ok(())
}

fn cmd_import(
    mode: Mode,
    reports: Vec<PathBuf>,
    base_dir: &Path,
    json: Option<PathBuf>,
) -> Result<()> {
    let base_dir = std::fs::canonicalize(base_dir)
        .with_context(|| format!("Could not find base directory: {}", base_dir.display()))?;

    let resolver = ProjectResolver::new(&base_dir);
    let mut sink = MemoryMeasureSink::new();
    let mut plan = MemoryTestPlan::new();
    let stats = import_mode(mode, &reports, &resolver, &mut sink, &mut plan)?;

    print_file_summaries(&sink, &plan);

    if let Some(path) = json {
        write_json(&path, "import", &[(mode, stats)], &sink, &plan)?;
    }

    Ok(())
}

fn cmd_check(mode: Mode, reports: Vec<PathBuf>) -> Result<()> {
    let mut sink = MemoryMeasureSink::new();
    for path in &reports {
        println!("{} {} report {}", "Checking".cyan(), mode, path.display());
    }
    let stats = import_reports(mode, &reports, &AcceptAllResolver, &mut sink, None)?;
    println!(
        "{} {} {} report file(s) are valid ({} files)",
        "✓".green(),
        reports.len(),
        mode,
        stats.matched_files
    );
    Ok(())
}

fn import_mode(
    mode: Mode,
    sources: &[PathBuf],
    resolver: &ProjectResolver,
    sink: &mut MemoryMeasureSink,
    plan: &mut MemoryTestPlan,
) -> Result<ImportStats> {
    for path in sources {
        println!("{} {} report {}", "Parsing".cyan(), mode, path.display());
    }
    let stats = import_reports(mode, sources, resolver, sink, Some(plan))?;

    println!(
        "{} Imported {} data for {} file(s)",
        "✓".green(),
        mode,
        stats.matched_files
    );
    if stats.unknown_files > 0 {
        println!(
            "  {} data ignored for {} unknown file(s), including:",
            mode, stats.unknown_files
        );
        for path in &stats.unknown_file_sample {
            println!("    {}", path.dimmed());
        }
    }
    Ok(stats)
}

/// Expands each configured glob pattern relative to the base directory. A
/// pattern that matches nothing is kept as a literal path, so a missing
/// report is reported as an error rather than silently skipped.
fn expand_patterns(patterns: &[String], base_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let full = if Path::new(pattern).is_absolute() {
            pattern.clone()
        } else {
            base_dir.join(pattern).to_string_lossy().into_owned()
        };
        let mut matched = false;
        for entry in
            glob::glob(&full).with_context(|| format!("Invalid report pattern: {}", pattern))?
        {
            paths.push(entry.with_context(|| format!("Unreadable match for {}", pattern))?);
            matched = true;
        }
        if !matched {
            paths.push(PathBuf::from(full));
        }
    }
    Ok(paths)
}

fn print_file_summaries(sink: &MemoryMeasureSink, plan: &MemoryTestPlan) {
    if sink.by_file.is_empty() {
        return;
    }
    println!();
    for file in sink.by_file.keys() {
        println!("  {}", file.bold());
        for (prefix, label) in [("", "coverage"), ("it_", "IT coverage"), ("overall_", "overall coverage")] {
            if let Some(line) = coverage_line(sink, file, prefix, label) {
                println!("    {}", line);
            }
        }
        if let Some(line) = test_line(sink, plan, file) {
            println!("    {}", line);
        }
    }
}

fn coverage_line(
    sink: &MemoryMeasureSink,
    file: &str,
    prefix: &str,
    label: &str,
) -> Option<String> {
    let total = int_value(sink, file, &format!("{}lines_to_cover", prefix))?;
    let uncovered = int_value(sink, file, &format!("{}uncovered_lines", prefix)).unwrap_or(0);
    let covered = total - uncovered;
    let percent = covered as f64 / total as f64 * 100.0;
    let mut line = format!(
        "{}: {} ({}/{} lines)",
        label,
        format_percent(percent),
        covered,
        total
    );
    if let Some(conditions) = int_value(sink, file, &format!("{}conditions_to_cover", prefix)) {
        let uncovered =
            int_value(sink, file, &format!("{}uncovered_conditions", prefix)).unwrap_or(0);
        line.push_str(&format!(
            ", branches {}/{}",
            conditions - uncovered,
            conditions
        ));
    }
    Some(line)
}

fn test_line(sink: &MemoryMeasureSink, plan: &MemoryTestPlan, file: &str) -> Option<String> {
    let tests = int_value(sink, file, "tests")?;
    let failures = int_value(sink, file, "test_failures").unwrap_or(0);
    let errors = int_value(sink, file, "test_errors").unwrap_or(0);
    let skipped = int_value(sink, file, "skipped_tests").unwrap_or(0);
    let status = if failures + errors > 0 {
        format!("{} failed", failures + errors).red().to_string()
    } else {
        "all passed".green().to_string()
    };
    let mut line = format!("tests: {} ({}, {} skipped)", tests, status, skipped);
    if let Some(cases) = plan.by_file.get(file) {
        let duration: u64 = cases.iter().map(|c| c.duration_ms).sum();
        line.push_str(&format!(", {} ms", duration));
    }
    Some(line)
}

fn int_value(sink: &MemoryMeasureSink, file: &str, metric: &str) -> Option<u64> {
    match sink.value(file, metric)? {
        MeasureValue::Int(value) => Some(*value),
        _ => None,
    }
}

fn format_percent(percent: f64) -> String {
    let formatted = format!("{:.1}%", percent);
    if percent >= 80.0 {
        formatted.green().to_string()
    } else if percent >= 50.0 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

#[derive(serde::Serialize)]
struct JsonExport<'a> {
    project: &'a str,
    generated_at: DateTime<Utc>,
    modes: Vec<JsonModeEntry<'a>>,
    files: &'a BTreeMap<String, Vec<Measure>>,
    test_cases: &'a BTreeMap<String, Vec<TestCaseData>>,
}

#[derive(serde::Serialize)]
struct JsonModeEntry<'a> {
    mode: String,
    #[serde(flatten)]
    stats: &'a ImportStats,
}

fn write_json(
    path: &Path,
    project: &str,
    modes: &[(Mode, ImportStats)],
    sink: &MemoryMeasureSink,
    plan: &MemoryTestPlan,
) -> Result<()> {
    let export = JsonExport {
        project,
        generated_at: Utc::now(),
        modes: modes
            .iter()
            .map(|(mode, stats)| JsonModeEntry {
                mode: mode.to_string(),
                stats,
            })
            .collect(),
        files: &sink.by_file,
        test_cases: &plan.by_file,
    };
    let json = serde_json::to_string_pretty(&export)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write JSON export: {}", path.display()))?;
    println!(
        "\n{} Measures exported: {}",
        "📊".cyan(),
        path.display().to_string().green()
    );
    Ok(())
}
