use crate::error::{AppError, Result};
use crate::models::{HydroYearDecision, StationLabel};
use crate::parser::StationHeader;
use crate::pipeline::PipelineReport;
use crate::stats::FittedDistribution;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(AppError::Config(format!(
                "Unknown output format '{}', expected 'csv' or 'json'",
                other
            ))),
        }
    }
}

/// Scalar results of a run, written alongside the tables.
#[derive(Debug, Serialize)]
pub struct Summary<'a> {
    pub header: &'a StationHeader,
    pub station: &'a StationLabel,
    pub decision: &'a HydroYearDecision,
    pub method: String,
    pub rainy_season_onset: u32,
    pub driest_month: Option<u32>,
    pub wettest_month: Option<u32>,
    pub total_years: usize,
    pub dropped_months: usize,
    pub fitted: &'a FittedDistribution,
}

impl<'a> From<&'a PipelineReport> for Summary<'a> {
    fn from(report: &'a PipelineReport) -> Self {
        Summary {
            header: &report.header,
            station: &report.station,
            decision: &report.decision,
            method: report.decision.method.to_string(),
            rainy_season_onset: report.rainy_season_onset(),
            driest_month: report.driest_month,
            wettest_month: report.wettest_month,
            total_years: report.total_years,
            dropped_months: report.dropped_months,
            fitted: &report.fitted,
        }
    }
}

/// Writes every table of the report into `dir`, plus `summary.json`.
/// Returns the paths written.
pub fn write_report(
    report: &PipelineReport,
    dir: &Path,
    format: OutputFormat,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let mut written = vec![
        write_table(dir, "cleaned_daily", &report.labeled, format)?,
        write_table(dir, "monthly_mean", &report.monthly_means, format)?,
        write_table(dir, "dry_season", &report.dry_season, format)?,
        write_table(dir, "annual_maxima", &report.annual_maxima, format)?,
        write_table(dir, "design_storm", &report.design_storm, format)?,
        write_table(dir, "intensity_matrix", &report.intensity_matrix, format)?,
    ];
    if let Some(moments) = &report.moment_design_storm {
        written.push(write_table(dir, "design_storm_moments", moments, format)?);
    }

    let summary_path = dir.join("summary.json");
    let writer = BufWriter::new(File::create(&summary_path)?);
    serde_json::to_writer_pretty(writer, &Summary::from(report))?;
    written.push(summary_path);

    info!("Wrote {} files to {}", written.len(), dir.display());
    Ok(written)
}

pub fn write_table<T: Serialize>(
    dir: &Path,
    name: &str,
    rows: &[T],
    format: OutputFormat,
) -> Result<PathBuf> {
    let path = dir.join(format!("{}.{}", name, format.extension()));
    match format {
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_path(&path)?;
            for row in rows {
                writer.serialize(row)?;
            }
            writer.flush()?;
        }
        OutputFormat::Json => {
            let writer = BufWriter::new(File::create(&path)?);
            serde_json::to_writer_pretty(writer, rows)?;
        }
    }
    Ok(path)
}
