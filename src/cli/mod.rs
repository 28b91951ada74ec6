//! Command-line interface
//!
//! Runs the analysis pipeline on a local file, profiles a file, or starts
//! the HTTP server.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::load_path;
use crate::pipeline::{AnalysisPipeline, AnalysisReport, PipelineConfig};
use crate::profiling::DatasetProfile;
use crate::reporting::PlotStyle;
use crate::server::{run_server, ServerConfig};
use crate::training::CancellationToken;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString { s.truecolor(100, 210, 120) }
fn warn(s: &str) -> ColoredString { s.truecolor(230, 180, 80) }

fn kv(key: &str, val: &str) {
    println!("  {:<20} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "hybrid-ml")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dataset analysis with a hybrid classifier ensemble")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Bind address
        #[arg(long, env = "API_HOST")]
        host: Option<String>,

        /// Server port
        #[arg(short, long, env = "API_PORT")]
        port: Option<u16>,

        /// Chart layout (full, simple)
        #[arg(long, env = "PLOT_STYLE")]
        plot_style: Option<PlotStyle>,
    },

    /// Run the full analysis on a local CSV or Excel file
    Analyze {
        /// Input data file
        file: PathBuf,

        /// Write the JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Chart layout (full, simple)
        #[arg(long, default_value = "full")]
        plot_style: PlotStyle,
    },

    /// Profile a data file without training
    Info {
        /// Input data file
        file: PathBuf,
    },
}

impl Cli {
    /// Dispatch the parsed command; no subcommand starts the server
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Some(Commands::Serve { host, port, plot_style }) => cmd_serve(host, port, plot_style).await,
            Some(Commands::Analyze { file, output, plot_style }) => {
                cmd_analyze(&file, output.as_deref(), plot_style)
            }
            Some(Commands::Info { file }) => cmd_info(&file),
            None => cmd_serve(None, None, None).await,
        }
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_serve(host: Option<String>, port: Option<u16>, plot_style: Option<PlotStyle>) -> anyhow::Result<()> {
    let defaults = ServerConfig::default();
    let config = ServerConfig {
        host: host.unwrap_or(defaults.host.clone()),
        port: port.unwrap_or(defaults.port),
        plot_style: plot_style.unwrap_or(defaults.plot_style),
        ..defaults
    };

    section("Hybrid ML server");
    kv("Address", &format!("http://{}:{}", config.host, config.port));
    kv("Health", &format!("http://{}:{}/api/health", config.host, config.port));
    kv("Plot style", &config.plot_style.to_string());
    println!();

    run_server(config).await
}

pub fn cmd_analyze(path: &Path, output: Option<&Path>, plot_style: PlotStyle) -> anyhow::Result<()> {
    section("Analyze");

    step_run("Loading data");
    let start = Instant::now();
    let dataset = load_path(path)?;
    step_done(&format!(
        "{} rows × {} cols in {:?}",
        dataset.n_rows(),
        dataset.n_cols(),
        start.elapsed()
    ));

    step_run("Training model battery");
    let start = Instant::now();
    let pipeline = AnalysisPipeline::new(PipelineConfig::default().with_plot_style(plot_style));
    let (report, _bundle) = pipeline.run(&dataset, &CancellationToken::new())?;
    step_done(&format!("{:.2?}", start.elapsed()));

    print_report(&report);

    if let Some(output) = output {
        step_run(&format!("Saving → {}", output.display()));
        std::fs::write(output, serde_json::to_string_pretty(&report)?)?;
        step_done("");
    }

    println!();
    Ok(())
}

pub fn cmd_info(path: &Path) -> anyhow::Result<()> {
    section("Dataset Info");

    let dataset = load_path(path)?;
    let profile = AnalysisPipeline::default().profile(&dataset)?;
    print_profile(&profile);

    println!();
    Ok(())
}

// ─── Output ────────────────────────────────────────────────────────────────────

fn print_profile(profile: &DatasetProfile) {
    kv("Shape", &format!("{} rows × {} cols", profile.n_rows(), profile.n_cols()));
    kv("Target", &profile.target_column);
    kv(
        "Task",
        if profile.is_classification { "classification" } else { "regression" },
    );
    kv("Numeric columns", &profile.numeric_columns.len().to_string());
    kv("Categorical columns", &profile.categorical_columns.len().to_string());
    kv("Duplicate rows", &profile.duplicate_rows.to_string());
    kv(
        "Missing (avg)",
        &format!("{:.1}%", profile.average_missing_percentage()),
    );

    println!();
    println!("  {:<24} {:>10} {:>8}", muted("Column"), muted("Type"), muted("Missing"));
    println!("  {}", dim(&"─".repeat(44)));
    for column in &profile.columns {
        let dtype = profile.dtypes.get(column).map(String::as_str).unwrap_or("?");
        let missing = profile.missing_values.get(column).copied().unwrap_or(0);
        println!("  {:<24} {:>10} {:>8}", column, dtype, missing);
    }
}

fn print_report(report: &AnalysisReport) {
    section("Dataset");
    print_profile(&report.dataset_info);

    section("Models");
    println!(
        "  {:<24} {:>8} {:>8} {:>8} {:>8}",
        muted("Model"),
        muted("Acc"),
        muted("F1"),
        muted("AUC"),
        muted("")
    );
    println!("  {}", dim(&"─".repeat(56)));
    for record in report.model_results.records() {
        let m = &record.metrics;
        let marker = if report.top_3_models.contains(&record.model) {
            ok("top").to_string()
        } else if record.is_failed() {
            "failed".red().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:<24} {:>8.4} {:>8.4} {:>8.4} {:>8}",
            record.model.name(),
            m.accuracy,
            m.f1_score,
            m.roc_auc,
            marker
        );
    }

    let perf = &report.feedback.model_performance;
    println!();
    println!(
        "  {} {} {:.4}",
        ok("best"),
        perf.best_model.white().bold(),
        perf.best_accuracy
    );
    kv(
        "Ensemble",
        &if report.ensemble_created {
            report
                .top_3_models
                .iter()
                .map(|k| k.name())
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            "not created".to_string()
        },
    );

    section("Feedback");
    for warning in &report.feedback.warnings {
        println!("  {} {}", warn("!"), warning);
    }
    for insight in &report.feedback.insights {
        println!("  {} {}", ok("✓"), insight);
    }
    for recommendation in &report.feedback.recommendations {
        println!("  {} {}", dim("·"), recommendation);
    }
}
