use crate::cleaner::{clean_dataset_with_threshold, CleanedDataset, DatasetInput};
use crate::design_storm::{
    design_storm_table, intensity_matrix_with_scaling, moment_design_storm_table, IntensityScaling,
};
use crate::error::{AppError, Result};
use crate::hydro_year::{
    assign_hydrological_years, count_years, driest_month, dry_season, monthly_mean_precipitation,
    resolve_hydrological_year, wettest_month,
};
use crate::models::{
    AnnualMaximum, DailyObservation, DesignStormRow, HydroYearDecision, HydroYearObservation,
    IntensityMatrixRow, MonthlyMean, StationLabel,
};
use crate::parser::{StationHeader, DEFAULT_FAILURE_THRESHOLD};
use crate::stats::{annual_maxima, fit_distribution, Distribution, FittedDistribution, MIN_ANNUAL_MAXIMA};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub distribution: Distribution,
    pub min_annual_maxima: usize,
    pub failure_threshold: f64,
    pub intensity_scaling: IntensityScaling,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            distribution: Distribution::Gev,
            min_annual_maxima: MIN_ANNUAL_MAXIMA,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            intensity_scaling: IntensityScaling::default(),
        }
    }
}

/// Every table a run produces. Recomputed from scratch on each call.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub header: StationHeader,
    pub station: StationLabel,
    pub cleaned: Vec<DailyObservation>,
    pub dropped_months: usize,
    pub monthly_means: Vec<MonthlyMean>,
    pub dry_season: Vec<MonthlyMean>,
    pub decision: HydroYearDecision,
    pub driest_month: Option<u32>,
    pub wettest_month: Option<u32>,
    pub labeled: Vec<HydroYearObservation>,
    pub total_years: usize,
    pub annual_maxima: Vec<AnnualMaximum>,
    pub fitted: FittedDistribution,
    pub design_storm: Vec<DesignStormRow>,
    pub moment_design_storm: Option<Vec<DesignStormRow>>,
    pub intensity_matrix: Vec<IntensityMatrixRow>,
}

/// Run every stage for one station.
pub fn run(input: DatasetInput, options: &PipelineOptions) -> Result<PipelineReport> {
    let cleaned = clean_dataset_with_threshold(input, options.failure_threshold)?;
    run_cleaned(cleaned, options)
}

pub fn run_cleaned(cleaned: CleanedDataset, options: &PipelineOptions) -> Result<PipelineReport> {
    if cleaned.is_empty() {
        return Err(AppError::MissingData(
            "No complete months remain after cleaning".to_string(),
        ));
    }

    let CleanedDataset {
        header,
        observations,
        dropped_months,
    } = cleaned;
    let station = header.station_label();
    info!(
        "Running pipeline for station {} with {} observations",
        station.name.as_deref().unwrap_or("<unnamed>"),
        observations.len()
    );

    let monthly_means = monthly_mean_precipitation(&observations);
    let dry_season = dry_season(&monthly_means);
    let dry_months: Vec<u32> = dry_season.iter().map(|m| m.month).collect();
    let decision = resolve_hydrological_year(&dry_months);

    let labeled = assign_hydrological_years(&observations, &decision);
    let total_years = count_years(&labeled);

    let maxima = annual_maxima(&labeled);
    let fitted = fit_distribution(options.distribution, &maxima, options.min_annual_maxima)?;

    let design_storm = design_storm_table(&fitted);
    let moment_design_storm = moment_design_storm_table(&maxima);
    let intensity_matrix =
        intensity_matrix_with_scaling(&design_storm, &station, options.intensity_scaling);

    info!(
        "{} starting in month {}, {} years, {} annual maxima",
        decision.method,
        decision.start_month,
        total_years,
        maxima.len()
    );

    Ok(PipelineReport {
        driest_month: driest_month(&monthly_means).map(|m| m.month),
        wettest_month: wettest_month(&monthly_means).map(|m| m.month),
        header,
        station,
        cleaned: observations,
        dropped_months,
        monthly_means,
        dry_season,
        decision,
        labeled,
        total_years,
        annual_maxima: maxima,
        fitted,
        design_storm,
        moment_design_storm,
        intensity_matrix,
    })
}

impl PipelineReport {
    /// First month of the rainy season, which is where the accounting year starts.
    pub fn rainy_season_onset(&self) -> u32 {
        self.decision.start_month
    }
}
