mod common;

use common::{date, export_text, seasonal_rows};
use rainfall_idf::cleaner::{clean_dataset, DatasetInput};
use rainfall_idf::error::AppError;
use rainfall_idf::models::{RawObservation, YearMethod};
use rainfall_idf::pipeline::{run, PipelineOptions};
use rainfall_idf::stats::{Distribution, FittedDistribution};
use std::path::PathBuf;

fn write_export(dir: &std::path::Path, rows: &[(chrono::NaiveDate, Option<f64>)]) -> PathBuf {
    let start = rows.first().unwrap().0;
    let end = rows.last().unwrap().0;
    let path = dir.join("dados_A001_D_test.csv");
    std::fs::write(&path, export_text(start, end, rows)).unwrap();
    path
}

/// Three hydrological years (December 2017 to November 2020) with a dry
/// season from June to November
fn three_year_rows() -> Vec<(chrono::NaiveDate, Option<f64>)> {
    seasonal_rows(date(2017, 12, 1), date(2020, 11, 30), &[80.0, 95.0, 120.0])
}

#[test]
fn test_end_to_end_hydrological_year() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_export(dir.path(), &three_year_rows());

    let report = run(DatasetInput::FilePath(path), &PipelineOptions::default())
        .expect("Pipeline failed");

    assert_eq!(report.decision.method, YearMethod::HydrologicalYear);
    assert_eq!(report.decision.start_month, 12);
    assert_eq!(report.decision.dry_window, vec![6, 7, 8, 9, 10, 11]);
    assert_eq!(report.rainy_season_onset(), 12);
    assert_eq!(report.driest_month, Some(6));

    assert_eq!(report.total_years, 3);
    assert_eq!(report.annual_maxima.len(), 3);
    let labels: Vec<i32> = report.annual_maxima.iter().map(|m| m.year_label).collect();
    assert_eq!(labels, vec![2018, 2019, 2020]);
    let peaks: Vec<f64> = report
        .annual_maxima
        .iter()
        .map(|m| m.max_daily_precipitation_mm)
        .collect();
    assert_eq!(peaks, vec![80.0, 95.0, 120.0]);

    let gev = report.fitted.gev().expect("Expected GEV parameters");
    assert!(gev.scale > 0.0);

    assert_eq!(report.design_storm.len(), 11);
    assert_eq!(report.intensity_matrix.len(), 143);
    assert_eq!(report.monthly_means.len(), 12);
    assert_eq!(report.dry_season.len(), 6);
    assert_eq!(report.station.name.as_deref(), Some("BRASILIA"));
}

#[test]
fn test_incomplete_month_dropped_without_error() {
    let mut rows = three_year_rows();
    // one gap in March 2019
    let gap = rows
        .iter()
        .position(|(d, _)| *d == date(2019, 3, 10))
        .unwrap();
    rows[gap].1 = None;

    let dir = tempfile::tempdir().unwrap();
    let path = write_export(dir.path(), &rows);
    let report = run(DatasetInput::FilePath(path), &PipelineOptions::default()).unwrap();

    assert_eq!(report.dropped_months, 1);
    assert!(!report
        .cleaned
        .iter()
        .any(|o| o.civil_year == 2019 && o.month == 3));
    assert_eq!(report.cleaned.len(), rows.len() - 31);
}

#[test]
fn test_civil_year_fallback_uses_dense_labels() {
    // odd months dry, even months wet: no contiguous dry window
    let rows: Vec<RawObservation> = date(2015, 1, 1)
        .iter_days()
        .take_while(|d| *d <= date(2018, 12, 31))
        .map(|d| {
            use chrono::Datelike;
            let value = if d.month() % 2 == 1 {
                0.1
            } else if d.day() == 10 {
                40.0 + (d.year() - 2015) as f64 * 12.5
            } else {
                5.0
            };
            RawObservation {
                date: Some(d),
                daily_precipitation_mm: Some(value),
            }
        })
        .collect();

    let report = run(DatasetInput::InMemoryTable(rows), &PipelineOptions::default()).unwrap();

    assert_eq!(report.decision.method, YearMethod::CivilYear);
    assert_eq!(report.decision.start_month, 1);
    let labels: Vec<i32> = report.annual_maxima.iter().map(|m| m.year_label).collect();
    assert_eq!(labels, vec![1, 2, 3, 4]);
    assert!(report.header.is_empty());
}

#[test]
fn test_in_memory_table_matches_file_input() {
    let rows = three_year_rows();
    let dir = tempfile::tempdir().unwrap();
    let path = write_export(dir.path(), &rows);

    let from_file = run(DatasetInput::FilePath(path), &PipelineOptions::default()).unwrap();
    let table: Vec<RawObservation> = rows
        .iter()
        .map(|(d, v)| RawObservation {
            date: Some(*d),
            daily_precipitation_mm: *v,
        })
        .collect();
    let from_table = run(DatasetInput::InMemoryTable(table), &PipelineOptions::default()).unwrap();

    assert_eq!(from_file.cleaned, from_table.cleaned);
    assert_eq!(from_file.annual_maxima, from_table.annual_maxima);
    assert_eq!(from_file.design_storm, from_table.design_storm);
}

#[test]
fn test_repeated_runs_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_export(dir.path(), &three_year_rows());

    let first = run(DatasetInput::FilePath(path.clone()), &PipelineOptions::default()).unwrap();
    let second = run(DatasetInput::FilePath(path), &PipelineOptions::default()).unwrap();

    assert_eq!(first.fitted, second.fitted);
    assert_eq!(first.design_storm, second.design_storm);
    assert_eq!(first.intensity_matrix, second.intensity_matrix);
}

#[test]
fn test_gumbel_option() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_export(dir.path(), &three_year_rows());
    let options = PipelineOptions {
        distribution: Distribution::Gumbel,
        ..PipelineOptions::default()
    };

    let report = run(DatasetInput::FilePath(path), &options).unwrap();
    assert!(matches!(report.fitted, FittedDistribution::Gumbel(_)));
    assert!(report.moment_design_storm.is_some());
}

#[test]
fn test_too_few_years_is_insufficient_data() {
    let rows = seasonal_rows(date(2018, 12, 1), date(2020, 11, 30), &[80.0, 95.0]);
    let dir = tempfile::tempdir().unwrap();
    let path = write_export(dir.path(), &rows);

    let result = run(DatasetInput::FilePath(path), &PipelineOptions::default());
    match result {
        Err(AppError::InsufficientData { found, required }) => {
            assert_eq!(found, 2);
            assert_eq!(required, 3);
        }
        other => panic!("Expected InsufficientData, got: {:?}", other.map(|r| r.annual_maxima)),
    }
}

#[test]
fn test_cleaner_accepts_path() {
    let dir = tempfile::tempdir().unwrap();
    let rows = three_year_rows();
    let path = write_export(dir.path(), &rows);

    let cleaned = clean_dataset(DatasetInput::FilePath(path)).unwrap();
    assert_eq!(cleaned.observations.len(), rows.len());
    assert_eq!(cleaned.dropped_months, 0);
    assert_eq!(cleaned.header.text("codigo_estacao"), Some("A001"));
}
