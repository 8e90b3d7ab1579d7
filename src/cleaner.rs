use crate::error::Result;
use crate::models::{DailyObservation, RawObservation};
use crate::parser::{Parser, StationHeader, DEFAULT_FAILURE_THRESHOLD};
use chrono::Datelike;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

/// Where the cleaner gets its rows from.
#[derive(Debug, Clone)]
pub enum DatasetInput {
    /// A BDMEP export on disk, header block included.
    FilePath(PathBuf),
    /// Rows already in canonical form. No header is available, so the year
    /// range is inferred from the data.
    InMemoryTable(Vec<RawObservation>),
}

#[derive(Debug, Clone, Default)]
pub struct CleanedDataset {
    pub header: StationHeader,
    pub observations: Vec<DailyObservation>,
    pub dropped_months: usize,
}

impl CleanedDataset {
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

pub fn clean_dataset(input: DatasetInput) -> Result<CleanedDataset> {
    clean_dataset_with_threshold(input, DEFAULT_FAILURE_THRESHOLD)
}

pub fn clean_dataset_with_threshold(
    input: DatasetInput,
    failure_threshold: f64,
) -> Result<CleanedDataset> {
    let (header, rows) = match input {
        DatasetInput::FilePath(path) => {
            let export = Parser::parse_file_with_threshold(&path, failure_threshold)?;
            info!(
                "Parsed {} rows from {}",
                export.observations.len(),
                path.display()
            );
            (export.header, export.observations)
        }
        DatasetInput::InMemoryTable(rows) => (StationHeader::default(), rows),
    };

    Ok(clean_rows(header, &rows))
}

/// Drops every (civil year, month) group that contains a missing
/// precipitation value, and every row outside the valid year range.
/// Input order is preserved.
pub fn clean_rows(header: StationHeader, rows: &[RawObservation]) -> CleanedDataset {
    // (civil_year, month) derived per row; unparseable dates stay None
    let keyed: Vec<(Option<(i32, u32)>, &RawObservation)> = rows
        .iter()
        .map(|row| (row.date.map(|d| (d.year(), d.month())), row))
        .collect();

    let Some((first_year, last_year)) = year_range(&header, &keyed) else {
        info!("Year range is undefined, returning an empty dataset");
        return CleanedDataset {
            header,
            ..Default::default()
        };
    };
    debug!("Valid year range {}..={}", first_year, last_year);

    let mut incomplete: HashSet<(i32, u32)> = HashSet::new();
    let mut seen: HashSet<(i32, u32)> = HashSet::new();
    for (key, row) in &keyed {
        let Some(key) = key else { continue };
        if key.0 < first_year || key.0 > last_year {
            continue;
        }
        seen.insert(*key);
        if row.daily_precipitation_mm.is_none() {
            incomplete.insert(*key);
        }
    }

    let observations: Vec<DailyObservation> = keyed
        .into_iter()
        .filter_map(|(key, row)| {
            let (civil_year, month) = key?;
            if civil_year < first_year || civil_year > last_year {
                return None;
            }
            if incomplete.contains(&(civil_year, month)) {
                return None;
            }
            Some(DailyObservation {
                date: row.date?,
                daily_precipitation_mm: row.daily_precipitation_mm?,
                civil_year,
                month,
            })
        })
        .collect();

    info!(
        "Cleaned dataset: kept {} of {} rows, dropped {} incomplete months out of {}",
        observations.len(),
        rows.len(),
        incomplete.len(),
        seen.len()
    );

    CleanedDataset {
        header,
        observations,
        dropped_months: incomplete.len(),
    }
}

/// Header bounds when both are present, otherwise the span of years in the data.
fn year_range(
    header: &StationHeader,
    keyed: &[(Option<(i32, u32)>, &RawObservation)],
) -> Option<(i32, i32)> {
    if let (Some(start), Some(end)) = (header.start_date(), header.end_date()) {
        return Some((start.year(), end.year()));
    }

    let years = keyed.iter().filter_map(|(key, _)| key.map(|(y, _)| y));
    let first = years.clone().min()?;
    let last = years.max()?;
    Some((first, last))
}
