use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use shape_simplifier::{simplify_project, Crs, DatasetOutcome, Manifest, PipelineConfig};

fn cli() -> Command {
    Command::new("Shape Simplifier")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Jesper Fjellin")
        .about("Converts shapefiles into simplified GeoJSON for quick visualization")
        .arg(
            Arg::new("manifest")
                .short('m')
                .long("manifest")
                .required(true)
                .help("JSON file listing the datasets to convert"),
        )
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .default_value(".")
                .help("Project root containing data/; output goes to geojsons_simplified/"),
        )
        .arg(
            Arg::new("crs")
                .long("crs")
                .default_value("EPSG:3857")
                .help("Target coordinate reference system"),
        )
        .arg(
            Arg::new("tolerance")
                .short('t')
                .long("tolerance")
                .value_parser(clap::value_parser!(f64))
                .default_value("1000")
                .help("Simplification tolerance in target CRS units"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log progress (INFO level)"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("Log detailed diagnostics (DEBUG level)"),
        )
}

fn main() -> Result<()> {
    let matches = cli().get_matches();

    let log_level = if matches.get_flag("debug") {
        Level::DEBUG
    } else if matches.get_flag("verbose") {
        Level::INFO
    } else {
        Level::WARN
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let manifest_path: PathBuf = matches
        .get_one::<String>("manifest")
        .map(PathBuf::from)
        .context("--manifest is required")?;
    let root: PathBuf = matches
        .get_one::<String>("root")
        .map(PathBuf::from)
        .context("--root has a default")?;

    let mut config = PipelineConfig::default();
    if let Some(crs) = matches.get_one::<String>("crs") {
        config.target_crs = Crs::parse(crs);
    }
    if let Some(tolerance) = matches.get_one::<f64>("tolerance") {
        config.tolerance = *tolerance;
    }

    let manifest = Manifest::from_path(&manifest_path)?;
    let report = simplify_project(&root, &manifest.datasets, &config);

    for dataset in &report.datasets {
        match &dataset.outcome {
            DatasetOutcome::Written { path, features, .. } => {
                println!("{}: {} features -> {}", dataset.name, features, path.display())
            }
            DatasetOutcome::Skipped(reason) => println!("{}: skipped ({})", dataset.name, reason),
            DatasetOutcome::Failed(e) => println!("{}: failed ({})", dataset.name, e),
        }
    }
    println!(
        "Processing completed: {} written, {} skipped, {} failed",
        report.written(),
        report.skipped(),
        report.failed()
    );

    Ok(())
}
