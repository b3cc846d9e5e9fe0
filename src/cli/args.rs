use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Portfolio evaluation dashboard
///
/// Compares human and AI ratings of portfolio candidates, serves the rating
/// dashboard and maintains the rating files.
#[derive(Parser, Debug)]
#[command(name = "portfolio-eval")]
#[command(version = "0.1.0")]
#[command(about = "Rate portfolios and compare human and AI evaluations")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a YAML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory the rating files are resolved against
    #[arg(short, long, default_value = ".", global = true)]
    pub data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the dashboard server
    Serve(ServeArgs),

    /// List evaluation runs, newest first
    Runs(RunsArgs),

    /// Hide a run from the dashboard, or show it again
    Hide(HideArgs),

    /// Gap report of one run against the human ratings
    Report(ReportArgs),

    /// Add penalty fields to ratings saved before red flags were scored
    Rescore(RescoreArgs),

    /// Convert a run from the legacy scale to the configured scale
    MigrateScale(MigrateScaleArgs),

    /// Generate a sample config file
    Init(InitArgs),
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on (overrides the config)
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Parser, Debug)]
pub struct RunsArgs {
    /// Include runs hidden from the dashboard
    #[arg(long)]
    pub all: bool,
}

#[derive(Parser, Debug)]
pub struct HideArgs {
    /// Run file name, e.g. evaluation_20250101_120000.json
    pub filename: String,

    /// Clear the flag instead of setting it
    #[arg(long)]
    pub show: bool,
}

#[derive(Parser, Debug)]
pub struct ReportArgs {
    /// Run file name
    pub filename: String,

    /// Print JSON instead of markdown
    #[arg(long)]
    pub json: bool,

    /// Also write the report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct RescoreArgs {
    /// Report what would change without writing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
pub struct MigrateScaleArgs {
    /// Run file name to convert
    pub filename: String,

    /// Also convert the human ratings file in place
    #[arg(long)]
    pub human: bool,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Output path for the config file
    #[arg(short, long, default_value = "portfolio-eval.yaml")]
    pub output: PathBuf,
}
