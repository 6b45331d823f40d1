//! PressDash - press and grant dashboard aggregator
//!
//! A CLI tool that recategorizes multi-tagged records with boolean rules
//! and writes time-binned counts or sums for plotting.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Error (bad arguments, config, data consistency, I/O)

use anyhow::{Context, Result};
use pressdash::cli::Args;
use pressdash::config::Config;
use pressdash::pipeline;
use pressdash::report;
use std::path::Path;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("PressDash v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run_dashboard(&args) {
        error!("Run failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

/// Handle --init-config: write a starter pressdash.yml.
fn handle_init_config() -> Result<()> {
    let path = Path::new("pressdash.yml");

    if path.exists() {
        eprintln!("⚠️  pressdash.yml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_yaml();
    std::fs::write(path, &content).context("Failed to write pressdash.yml")?;

    println!("✅ Created pressdash.yml with default settings.");
    println!("   Edit it to set your data columns, categories and filters.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load, aggregate and export.
fn run_dashboard(args: &Args) -> Result<()> {
    let mut config = load_config(args)?;
    config.merge_with_args(args)?;

    println!("📥 Loading data...");
    let (raw, path) = pipeline::load_data(&config.data)?;
    println!("   {} ({} rows)", path.display(), raw.len());

    println!("🏷️  Recategorizing and aggregating...");
    let output = pipeline::run(&config, &raw, &path.display().to_string())?;

    let out_dir = Path::new(&config.output.dir);
    let written = report::write_outputs(
        &output.report,
        &output.selected,
        out_dir,
        config.output.format,
    )?;

    let metadata = &output.report.metadata;
    println!("\n📊 Summary:");
    println!("   View: {}", output.plan.axis_label());
    println!(
        "   Rows: {} selected of {} preprocessed",
        metadata.rows_selected, metadata.rows_preprocessed
    );
    println!("   Entities: {}", metadata.entities_selected);
    println!(
        "   Bins: {} | Groups: {}",
        output.report.total.bins.len(),
        output.report.aggregated.groups.len()
    );
    println!("   Duration: {:.1}s", metadata.duration_seconds);

    println!("\n✅ Done! Files written:");
    for path in &written {
        println!("   📄 {}", path.display());
    }

    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default locations; a file that exists but is broken is an error
    match Config::load_default()? {
        Some(config) => {
            info!("Loaded default config from the working directory");
            Ok(config)
        }
        None => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}
