use clap::Parser;
use rainfall_idf::cleaner::DatasetInput;
use rainfall_idf::config::Config;
use rainfall_idf::output::{write_report, OutputFormat};
use rainfall_idf::pipeline;
use rainfall_idf::stats::Distribution;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "rainfall-idf",
    version,
    about = "Design-rainfall intensities from a BDMEP daily station export"
)]
struct Cli {
    /// Path to the YAML configuration
    #[arg(long, default_value = "config/config.yaml")]
    config: PathBuf,

    /// Station export to process
    #[arg(long, conflicts_with = "station", required_unless_present = "station")]
    file: Option<PathBuf>,

    /// Station code, looked up in the configured data directory
    #[arg(long)]
    station: Option<String>,

    /// Distribution family (overrides the configuration)
    #[arg(long)]
    distribution: Option<String>,

    /// Output format: csv or json (overrides the configuration)
    #[arg(long)]
    format: Option<String>,

    /// Output directory (overrides the configuration)
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rainfall_idf=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config).map_err(|e| {
        anyhow::anyhow!(
            "Failed to load configuration: {}\n\n\
             Make sure:\n\
             1. {} exists (or pass --config)\n\
             2. All referenced environment variables are set\n\
             3. Create a .env file if needed",
            e,
            cli.config.display()
        )
    })?;
    info!("Configuration loaded from {}", cli.config.display());

    let mut options = config.pipeline_options()?;
    if let Some(name) = &cli.distribution {
        options.distribution = name.parse::<Distribution>()?;
    }
    let format = match &cli.format {
        Some(f) => f.parse::<OutputFormat>()?,
        None => config.output_format()?,
    };
    let output_dir = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.output.directory));

    let path = match (&cli.file, &cli.station) {
        (Some(file), _) => file.clone(),
        (None, Some(code)) => config.data.find_station_file(code)?,
        (None, None) => anyhow::bail!("Either --file or --station is required"),
    };
    info!("Processing {}", path.display());

    let report = match pipeline::run(DatasetInput::FilePath(path.clone()), &options) {
        Ok(report) => report,
        Err(e @ rainfall_idf::error::AppError::MissingData(_)) => {
            warn!("Skipping {}: {}", path.display(), e);
            return Ok(());
        }
        Err(e) => {
            return Err(anyhow::anyhow!(
                "Failed to process {}: {}",
                path.display(),
                e
            ))
        }
    };

    for row in &report.design_storm {
        info!(
            "Tr = {:>4} years  h_max,1 = {:>8.2} mm",
            row.return_period_years, row.h_max_1day_mm
        );
    }

    let written = write_report(&report, &output_dir, format)?;
    info!(
        "Wrote {} files to {} ({} starting in month {})",
        written.len(),
        output_dir.display(),
        report.decision.method,
        report.decision.start_month
    );

    Ok(())
}
