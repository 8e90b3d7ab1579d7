use crate::models::{
    DailyObservation, HydroYearDecision, HydroYearObservation, MonthlyMean, YearMethod,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Months in the dry-season window.
pub const DRY_SEASON_LEN: usize = 6;

/// Mean of the per-year monthly totals, one row per calendar month present.
///
/// Each year contributes one total per month regardless of how many days it
/// recorded, so a January with one valid day and a January with thirty both
/// weigh the same.
pub fn monthly_mean_precipitation(observations: &[DailyObservation]) -> Vec<MonthlyMean> {
    let mut totals: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for obs in observations {
        *totals.entry((obs.civil_year, obs.month)).or_insert(0.0) += obs.daily_precipitation_mm;
    }

    let mut by_month: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
    for ((_, month), total) in totals {
        let entry = by_month.entry(month).or_insert((0.0, 0));
        entry.0 += total;
        entry.1 += 1;
    }

    by_month
        .into_iter()
        .map(|(month, (sum, count))| MonthlyMean {
            month,
            mean_precipitation_mm: sum / count as f64,
        })
        .collect()
}

/// The six months with the lowest mean, driest first. Ties keep month order.
pub fn dry_season(monthly: &[MonthlyMean]) -> Vec<MonthlyMean> {
    let mut sorted = monthly.to_vec();
    sorted.sort_by(|a, b| {
        a.mean_precipitation_mm
            .total_cmp(&b.mean_precipitation_mm)
            .then(a.month.cmp(&b.month))
    });
    sorted.truncate(DRY_SEASON_LEN);
    sorted
}

pub fn driest_month(monthly: &[MonthlyMean]) -> Option<&MonthlyMean> {
    monthly
        .iter()
        .min_by(|a, b| a.mean_precipitation_mm.total_cmp(&b.mean_precipitation_mm))
}

pub fn wettest_month(monthly: &[MonthlyMean]) -> Option<&MonthlyMean> {
    monthly
        .iter()
        .max_by(|a, b| a.mean_precipitation_mm.total_cmp(&b.mean_precipitation_mm))
}

/// Finds the calendar-order 6-month window, wrapping past December, whose
/// month set equals `months`. Candidate starts are tried in ascending order.
pub fn contiguous_window(months: &[u32]) -> Option<Vec<u32>> {
    let mut sorted = months.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != DRY_SEASON_LEN {
        return None;
    }

    sorted.iter().find_map(|&start| {
        let mut window: Vec<u32> = (0..DRY_SEASON_LEN as u32)
            .map(|i| (start + i - 1) % 12 + 1)
            .collect();
        let canonical = window.clone();
        window.sort_unstable();
        (window == sorted).then_some(canonical)
    })
}

pub fn is_contiguous(months: &[u32]) -> bool {
    contiguous_window(months).is_some()
}

/// Decides between a hydrological and a civil accounting year from the
/// dry-season months. Total for any input.
pub fn resolve_hydrological_year(dry_months: &[u32]) -> HydroYearDecision {
    match contiguous_window(dry_months) {
        Some(window) => {
            let last = window[DRY_SEASON_LEN - 1];
            let start_month = last % 12 + 1;
            info!(
                "Dry season {:?} is contiguous, hydrological year starts in month {}",
                window, start_month
            );
            HydroYearDecision {
                method: YearMethod::HydrologicalYear,
                start_month,
                dry_window: window,
            }
        }
        None => {
            info!(
                "Dry season {:?} is not contiguous, falling back to civil year",
                dry_months
            );
            HydroYearDecision {
                method: YearMethod::CivilYear,
                start_month: 1,
                dry_window: Vec::new(),
            }
        }
    }
}

/// Labels every observation with its accounting year.
///
/// Civil years become a dense index 1..=N in order of first appearance.
/// Hydrological years are named after the civil year in which they end, so
/// months at or after the start month roll into the next year.
pub fn assign_hydrological_years(
    observations: &[DailyObservation],
    decision: &HydroYearDecision,
) -> Vec<HydroYearObservation> {
    let mut dense: HashMap<i32, i32> = HashMap::new();

    observations
        .iter()
        .map(|obs| {
            let hydro_year = match decision.method {
                YearMethod::CivilYear => {
                    let next = dense.len() as i32 + 1;
                    *dense.entry(obs.civil_year).or_insert(next)
                }
                YearMethod::HydrologicalYear => {
                    if obs.month >= decision.start_month {
                        obs.civil_year + 1
                    } else {
                        obs.civil_year
                    }
                }
            };
            HydroYearObservation {
                date: obs.date,
                daily_precipitation_mm: obs.daily_precipitation_mm,
                civil_year: obs.civil_year,
                month: obs.month,
                hydro_year,
            }
        })
        .collect()
}

/// Number of distinct year labels.
pub fn count_years(labeled: &[HydroYearObservation]) -> usize {
    let mut years: Vec<i32> = labeled.iter().map(|o| o.hydro_year).collect();
    years.sort_unstable();
    years.dedup();
    debug!("{} distinct year labels", years.len());
    years.len()
}
