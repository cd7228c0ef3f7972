#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI for generating the per-ZIP hazard risk table.
//!
//! Every path defaults to the `[sources]` section of the region reference
//! file; pass `--reference` to score a different region.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hazard_risk_pipeline::config::{RegionConfig, SourcePaths};

#[derive(Parser)]
#[command(
    name = "hazard_risk_pipeline",
    about = "Score flood, wildfire, and earthquake risk per ZIP"
)]
struct Cli {
    /// ZIP boundary layer (`GeoJSON` or Shapefile)
    #[arg(long)]
    zips: Option<PathBuf>,

    /// Flood-control district layer
    #[arg(long)]
    flood: Option<PathBuf>,

    /// Wildfire hazard zone layer
    #[arg(long)]
    wildfire: Option<PathBuf>,

    /// Fault line layer
    #[arg(long)]
    faults: Option<PathBuf>,

    /// Output CSV path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Region reference TOML (defaults to the embedded Alameda County data)
    #[arg(long)]
    reference: Option<PathBuf>,
}

impl Cli {
    fn sources(&self, defaults: &SourcePaths) -> SourcePaths {
        let pick = |arg: &Option<PathBuf>, default: &PathBuf| {
            arg.clone().unwrap_or_else(|| default.clone())
        };
        SourcePaths {
            zips: pick(&self.zips, &defaults.zips),
            flood: pick(&self.flood, &defaults.flood),
            wildfire: pick(&self.wildfire, &defaults.wildfire),
            faults: pick(&self.faults, &defaults.faults),
            output: pick(&self.output, &defaults.output),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.reference {
        Some(path) => RegionConfig::from_path(path)?,
        None => RegionConfig::reference()?,
    };
    let sources = cli.sources(&config.sources);

    let summary = hazard_risk_pipeline::run(Arc::new(config), &sources).await?;

    println!(
        "Wrote {} ZIP rows to {}",
        summary.rows,
        summary.output.display()
    );

    Ok(())
}
