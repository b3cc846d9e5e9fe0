mod analytics;
mod cli;
mod maintenance;
mod ratings;
mod scoring;
mod store;
mod web;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Args, Command, DashboardConfig};
use scoring::GapReport;
use store::{FileRatingStore, RatingStore};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging on stderr; RUST_LOG takes precedence over --verbose
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = DashboardConfig::load_or_default(args.config.as_deref())?;
    let store = FileRatingStore::new(config.data.resolve(&args.data_dir));

    match args.command {
        Command::Serve(serve_args) => {
            start_dashboard(config, store, serve_args).await?;
        }
        Command::Runs(runs_args) => {
            list_runs(&store, runs_args).await?;
        }
        Command::Hide(hide_args) => {
            set_visibility(&store, hide_args).await?;
        }
        Command::Report(report_args) => {
            print_report(&config, &store, report_args).await?;
        }
        Command::Rescore(rescore_args) => {
            rescore(&config, &store, rescore_args).await?;
        }
        Command::MigrateScale(migrate_args) => {
            migrate_scale(&config, &store, migrate_args).await?;
        }
        Command::Init(init_args) => {
            generate_sample_config(init_args)?;
        }
    }

    Ok(())
}

async fn list_runs(store: &FileRatingStore, args: cli::RunsArgs) -> Result<()> {
    let runs = store.list_runs().await?;

    if runs.is_empty() {
        println!("No evaluation runs in {:?}", store.paths().results_dir);
        return Ok(());
    }

    println!(
        "{:<45} {:<27} {:<20} {:>5} {:<8}",
        "FILE", "TIMESTAMP", "MODEL", "N", "STATUS"
    );
    for run in runs.iter().filter(|r| args.all || !r.hide_from_dashboard) {
        let status = match (run.complete, run.hide_from_dashboard) {
            (_, true) => "hidden",
            (true, false) => "complete",
            (false, false) => "partial",
        };
        println!(
            "{:<45} {:<27} {:<20} {:>5} {:<8}",
            run.filename, run.timestamp, run.model, run.total_candidates, status
        );
    }

    let hidden = runs.iter().filter(|r| r.hide_from_dashboard).count();
    if hidden > 0 && !args.all {
        println!("\n{} hidden runs not shown (use --all)", hidden);
    }

    Ok(())
}

async fn set_visibility(store: &FileRatingStore, args: cli::HideArgs) -> Result<()> {
    let hidden = !args.show;
    let run = store
        .set_run_visibility(&args.filename, hidden)
        .await
        .context(format!("Failed to update run {}", args.filename))?;

    if run.hide_from_dashboard {
        println!("Hidden from dashboard: {}", run.filename);
    } else {
        println!("Shown on dashboard: {}", run.filename);
    }

    Ok(())
}

async fn print_report(
    config: &DashboardConfig,
    store: &FileRatingStore,
    args: cli::ReportArgs,
) -> Result<()> {
    let human = store.human_ratings().await?;
    let ai = store
        .run_evaluations(&args.filename)
        .await
        .context(format!("Failed to read run {}", args.filename))?;

    let rubric = store.rubric().await.ok();
    let flags = analytics::tracked_red_flags(rubric.as_ref());

    let report = GapReport::build(
        &args.filename,
        &human,
        &ai,
        &flags,
        &config.scoring.comparison(),
    );

    let rendered = if args.json {
        serde_json::to_string_pretty(&report)?
    } else {
        report.render_text()
    };

    println!("{}", rendered);

    if let Some(output) = args.output {
        std::fs::write(&output, &rendered)
            .context(format!("Failed to write report: {:?}", output))?;
        info!("Report saved to {:?}", output);
    }

    Ok(())
}

async fn rescore(
    config: &DashboardConfig,
    store: &FileRatingStore,
    args: cli::RescoreArgs,
) -> Result<()> {
    let engine = analytics::load_engine(store, config.scoring.scale).await;

    if args.dry_run {
        println!("Dry run mode - no files will be written\n");
    }

    println!("Penalty weights:");
    for (flag, penalty) in engine.penalties().iter() {
        println!("  {}: -{:.1}", flag, penalty);
    }
    println!();

    let files = maintenance::rescore(store, &engine, args.dry_run).await?;

    for file in &files {
        println!(
            "  {}: {} updated, {} with penalties",
            file.name, file.updated, file.penalized
        );
    }

    let updated: usize = files.iter().map(|f| f.updated).sum();
    let penalized: usize = files.iter().map(|f| f.penalized).sum();
    println!("\n{}", "=".repeat(60));
    println!("Evaluations updated: {}", updated);
    println!("Evaluations with penalties: {}", penalized);

    Ok(())
}

async fn migrate_scale(
    config: &DashboardConfig,
    store: &FileRatingStore,
    args: cli::MigrateScaleArgs,
) -> Result<()> {
    let engine = analytics::load_engine(store, config.scoring.scale).await;
    let from = config.scoring.legacy_scale;

    println!(
        "Converting {} from {} to {} scale",
        args.filename,
        from,
        engine.scale()
    );

    let target = maintenance::migrate_run(store, &engine, &args.filename, &from).await?;
    println!("Saved migrated run as: {}", target);

    if args.human {
        let count = maintenance::migrate_human(store, &engine, &from).await?;
        println!("Converted {} human ratings in place", count);
    }

    Ok(())
}

fn generate_sample_config(args: cli::InitArgs) -> Result<()> {
    let config = DashboardConfig::sample();

    config.save(&args.output)?;
    println!("Generated sample config at: {:?}", args.output);

    Ok(())
}

async fn start_dashboard(
    config: DashboardConfig,
    store: FileRatingStore,
    args: cli::ServeArgs,
) -> Result<()> {
    let port = args.port.unwrap_or(config.server.port);
    info!("Starting dashboard on port {}", port);
    info!("Results directory: {:?}", store.paths().results_dir);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                 Portfolio Evaluation Dashboard                ║");
    println!("╠═══════════════════════════════════════════════════════════════╣");
    println!("║  Open http://localhost:{:<5} in your browser                 ║", port);
    println!("║                                                               ║");
    println!("║  Pages:                                                       ║");
    println!("║    /                  - Evaluate and analytics tabs           ║");
    println!("║    /report/<run>      - Gap report for one run                ║");
    println!("║                                                               ║");
    println!("║  Press Ctrl+C to stop the server                              ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    web::start_server(port, web::AppState::new(config, store)).await?;

    Ok(())
}
