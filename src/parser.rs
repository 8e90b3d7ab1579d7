use crate::error::{AppError, Result};
use crate::models::{RawObservation, StationLabel};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// Number of `key: value` lines that precede the data table.
pub const HEADER_LINES: usize = 9;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

const NUMERIC_KEYS: &[&str] = &["latitude", "longitude", "altitude"];
const DATE_KEYS: &[&str] = &["data_inicial", "data_final"];
const MISSING_TOKENS: &[&str] = &["", "null", "NULL", "NaN", "nan", "-"];

/// Default failure threshold - fail if more than 10% of rows fail to parse
pub const DEFAULT_FAILURE_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

/// Station metadata from the export header, keyed by normalized field name
/// (lower-case, spaces replaced with underscores).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationHeader {
    fields: BTreeMap<String, HeaderValue>,
}

impl StationHeader {
    pub fn from_fields(fields: BTreeMap<String, HeaderValue>) -> Self {
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.fields.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.fields.get(key)? {
            HeaderValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn date(&self, key: &str) -> Option<NaiveDate> {
        match self.fields.get(key)? {
            HeaderValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.fields.get(key)? {
            HeaderValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.date("data_inicial")
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.date("data_final")
    }

    pub fn station_label(&self) -> StationLabel {
        StationLabel {
            name: self.text("nome").map(str::to_string),
            latitude: self.number("latitude"),
            longitude: self.number("longitude"),
            altitude: self.number("altitude"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HeaderValue)> {
        self.fields.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalColumn {
    Date,
    DailyPrecipitation,
    MeanTemperature,
    MeanRelativeHumidity,
    MeanWindSpeed,
}

impl CanonicalColumn {
    /// Only the date and precipitation columns feed the pipeline.
    pub fn is_retained(&self) -> bool {
        matches!(self, CanonicalColumn::Date | CanonicalColumn::DailyPrecipitation)
    }
}

/// Declarative mapping from raw export column names to canonical columns.
/// Format drift is handled by editing the tables, not the parsing code.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSchema {
    pub mappings: &'static [(&'static str, CanonicalColumn)],
    pub drop: &'static [&'static str],
}

pub const BDMEP_SCHEMA: ColumnSchema = ColumnSchema {
    mappings: &[
        ("Data Medicao", CanonicalColumn::Date),
        ("PRECIPITACAO TOTAL, DIARIO (AUT)(mm)", CanonicalColumn::DailyPrecipitation),
        ("TEMPERATURA MEDIA, DIARIA (AUT)(°C)", CanonicalColumn::MeanTemperature),
        ("UMIDADE RELATIVA DO AR, MEDIA DIARIA (AUT)(%)", CanonicalColumn::MeanRelativeHumidity),
        ("VENTO, VELOCIDADE MEDIA DIARIA (AUT)(m/s)", CanonicalColumn::MeanWindSpeed),
        // already-canonical names
        ("data medicao", CanonicalColumn::Date),
        ("date", CanonicalColumn::Date),
        ("precipitacao total diaria (mm)", CanonicalColumn::DailyPrecipitation),
        ("daily_precipitation_mm", CanonicalColumn::DailyPrecipitation),
    ],
    drop: &["", "Unnamed: 5"],
};

/// What to do with a column at a given position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Keep(CanonicalColumn),
    Discard,
}

impl ColumnSchema {
    pub fn resolve(&self, raw_name: &str) -> ColumnRole {
        let name = raw_name.trim();
        if self.drop.iter().any(|d| d.eq_ignore_ascii_case(name)) {
            return ColumnRole::Discard;
        }
        self.mappings
            .iter()
            .find(|(raw, _)| raw.eq_ignore_ascii_case(name))
            .map(|(_, canonical)| ColumnRole::Keep(*canonical))
            .unwrap_or(ColumnRole::Discard)
    }

    fn locate(&self, headers: &StringRecord) -> Result<(usize, usize)> {
        let mut date_idx = None;
        let mut precip_idx = None;

        for (idx, name) in headers.iter().enumerate() {
            match self.resolve(name) {
                ColumnRole::Keep(CanonicalColumn::Date) if date_idx.is_none() => {
                    date_idx = Some(idx)
                }
                ColumnRole::Keep(CanonicalColumn::DailyPrecipitation) if precip_idx.is_none() => {
                    precip_idx = Some(idx)
                }
                ColumnRole::Keep(column) if !column.is_retained() => {
                    debug!("Discarding column '{}' ({:?})", name, column)
                }
                _ => debug!("Dropping column {} '{}'", idx, name),
            }
        }

        match (date_idx, precip_idx) {
            (Some(d), Some(p)) => Ok((d, p)),
            (None, _) => Err(AppError::Parse(format!(
                "No date column found in table header: {:?}",
                headers.iter().collect::<Vec<_>>()
            ))),
            (_, None) => Err(AppError::Parse(format!(
                "No daily precipitation column found in table header: {:?}",
                headers.iter().collect::<Vec<_>>()
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ParseStats {
    pub total_rows: usize,
    pub parsed_successfully: usize,
    pub parse_failures: usize,
    pub empty_rows: usize,
    pub failure_rate: f64,
}

impl ParseStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finalize(&mut self) {
        let non_empty = self.total_rows - self.empty_rows;
        self.failure_rate = if non_empty > 0 {
            self.parse_failures as f64 / non_empty as f64
        } else {
            0.0
        };
    }

    pub fn exceeds_threshold(&self, threshold: f64) -> bool {
        self.failure_rate > threshold
    }
}

/// A parsed station export.
#[derive(Debug, Clone)]
pub struct StationExport {
    pub header: StationHeader,
    pub observations: Vec<RawObservation>,
    pub stats: ParseStats,
}

pub struct Parser;

impl Parser {
    /// Read and parse a station export from disk
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<StationExport> {
        Self::parse_file_with_threshold(path, DEFAULT_FAILURE_THRESHOLD)
    }

    pub fn parse_file_with_threshold<P: AsRef<Path>>(
        path: P,
        failure_threshold: f64,
    ) -> Result<StationExport> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AppError::MissingData(format!("Station file not found: {}", path.display()))
            }
            _ => AppError::Io(e),
        })?;
        debug!("Read {} bytes from {}", content.len(), path.display());
        Self::parse_str_with_threshold(&content, failure_threshold)
    }

    /// Parse the text of a station export
    pub fn parse_str(content: &str) -> Result<StationExport> {
        Self::parse_str_with_threshold(content, DEFAULT_FAILURE_THRESHOLD)
    }

    pub fn parse_str_with_threshold(
        content: &str,
        failure_threshold: f64,
    ) -> Result<StationExport> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let lines: Vec<&str> = content.lines().take(HEADER_LINES).collect();
        if lines.len() < HEADER_LINES {
            return Err(AppError::Parse(format!(
                "Expected {} header lines, got {}",
                HEADER_LINES,
                lines.len()
            )));
        }

        let header = Self::parse_header(&lines)?;
        let table = content
            .split_inclusive('\n')
            .skip(HEADER_LINES)
            .collect::<String>();
        let (observations, stats) = Self::parse_table(&table, &BDMEP_SCHEMA)?;

        if stats.exceeds_threshold(failure_threshold) {
            return Err(AppError::Parse(format!(
                "Parse failure rate {:.1}% exceeds threshold {:.1}%: {} failures out of {} non-empty rows",
                stats.failure_rate * 100.0,
                failure_threshold * 100.0,
                stats.parse_failures,
                stats.total_rows - stats.empty_rows
            )));
        }

        Ok(StationExport {
            header,
            observations,
            stats,
        })
    }

    /// Parse the `key: value` header block
    pub fn parse_header(lines: &[&str]) -> Result<StationHeader> {
        let mut fields = BTreeMap::new();

        for line in lines {
            let Some((key, value)) = line.trim().split_once(':') else {
                continue;
            };
            let key = normalize_key(key);
            let value = value.trim();

            let parsed = if NUMERIC_KEYS.contains(&key.as_str()) {
                HeaderValue::Number(parse_decimal(value).ok_or_else(|| {
                    AppError::Parse(format!("Header field '{}' is not numeric: '{}'", key, value))
                })?)
            } else if DATE_KEYS.contains(&key.as_str()) {
                HeaderValue::Date(NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
                    AppError::Parse(format!(
                        "Header field '{}' is not a {} date: '{}' ({})",
                        key, DATE_FORMAT, value, e
                    ))
                })?)
            } else {
                HeaderValue::Text(value.to_string())
            };

            fields.insert(key, parsed);
        }

        Ok(StationHeader::from_fields(fields))
    }

    /// Parse the ';'-delimited table that follows the header
    pub fn parse_table(
        table: &str,
        schema: &ColumnSchema,
    ) -> Result<(Vec<RawObservation>, ParseStats)> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(table.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| AppError::Parse(format!("Failed to read table header: {}", e)))?
            .clone();
        if headers.is_empty() {
            return Err(AppError::Parse("Table header row is empty".to_string()));
        }
        let (date_idx, precip_idx) = schema.locate(&headers)?;

        let mut observations = Vec::new();
        let mut stats = ParseStats::new();

        for (row_num, record) in reader.records().enumerate() {
            stats.total_rows += 1;
            // header block + table header + 1-based row
            let line_num = HEADER_LINES + row_num + 2;

            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    stats.parse_failures += 1;
                    warn!("Failed to read row at line {}: {}", line_num, e);
                    continue;
                }
            };

            if record.iter().all(|f| f.is_empty()) {
                stats.empty_rows += 1;
                continue;
            }

            let (observation, ok) = parse_row(&record, date_idx, precip_idx);
            if ok {
                stats.parsed_successfully += 1;
            } else {
                stats.parse_failures += 1;
                warn!(
                    "Malformed row at line {} (failure {}/{}): {:?}",
                    line_num,
                    stats.parse_failures,
                    stats.total_rows - stats.empty_rows,
                    record.iter().collect::<Vec<_>>()
                );
            }
            observations.push(observation);
        }

        stats.finalize();
        debug!(
            "Parsed {} rows ({} failures, {} empty)",
            stats.total_rows, stats.parse_failures, stats.empty_rows
        );

        Ok((observations, stats))
    }
}

/// Unparseable cells become nulls; the row is kept so that the cleaner can
/// drop its month. Returns whether every cell parsed cleanly.
fn parse_row(
    record: &StringRecord,
    date_idx: usize,
    precip_idx: usize,
) -> (RawObservation, bool) {
    let date_field = record.get(date_idx).unwrap_or("");
    let precip_field = record.get(precip_idx).unwrap_or("");

    let date = NaiveDate::parse_from_str(date_field, DATE_FORMAT).ok();
    let (daily_precipitation_mm, precip_ok) = parse_optional_decimal(precip_field);

    (
        RawObservation {
            date,
            daily_precipitation_mm,
        },
        date.is_some() && precip_ok,
    )
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace(' ', "_")
}

/// Accepts either '.' or ',' as the decimal separator.
fn parse_decimal(s: &str) -> Option<f64> {
    let s = s.trim();
    s.parse::<f64>()
        .ok()
        .or_else(|| s.replace(',', ".").parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn parse_optional_decimal(s: &str) -> (Option<f64>, bool) {
    if MISSING_TOKENS.contains(&s.trim()) {
        return (None, true);
    }
    match parse_decimal(s) {
        Some(v) => (Some(v), true),
        None => (None, false),
    }
}
