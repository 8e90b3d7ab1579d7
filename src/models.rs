use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A table row as it comes out of the export (or an in-memory table), before
/// any cleaning. Both fields are nullable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub date: Option<NaiveDate>,
    pub daily_precipitation_mm: Option<f64>,
}

/// A cleaned daily observation. Only rows from complete (year, month) groups
/// survive cleaning, so the precipitation value is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyObservation {
    pub date: NaiveDate,
    pub daily_precipitation_mm: f64,
    pub civil_year: i32,
    pub month: u32,
}

/// A cleaned observation labeled with its hydrological (or dense civil) year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydroYearObservation {
    pub date: NaiveDate,
    pub daily_precipitation_mm: f64,
    pub civil_year: i32,
    pub month: u32,
    pub hydro_year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyMean {
    pub month: u32,
    pub mean_precipitation_mm: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearMethod {
    HydrologicalYear,
    CivilYear,
}

impl fmt::Display for YearMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearMethod::HydrologicalYear => write!(f, "hydrological year"),
            YearMethod::CivilYear => write!(f, "civil year"),
        }
    }
}

/// Outcome of the dry-season analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydroYearDecision {
    pub method: YearMethod,
    /// First month of the accounting year, always in 1..=12.
    pub start_month: u32,
    /// The contiguous dry window in calendar order, empty for civil years.
    pub dry_window: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualMaximum {
    pub year_label: i32,
    pub max_daily_precipitation_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignStormRow {
    pub return_period_years: u32,
    pub exceedance_probability: f64,
    pub annual_frequency: f64,
    pub h_max_1day_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityMatrixRow {
    pub concentration_time_minutes: u32,
    pub return_period_years: u32,
    pub intensity_mm_per_hour: f64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub station_name: Option<String>,
}

/// Station identity carried onto every intensity row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationLabel {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}
