#![allow(dead_code)]

use chrono::{Datelike, NaiveDate};

pub const TABLE_HEADER: &str = "Data Medicao;PRECIPITACAO TOTAL, DIARIO (AUT)(mm);TEMPERATURA MEDIA, DIARIA (AUT)(°C);UMIDADE RELATIVA DO AR, MEDIA DIARIA (AUT)(%);VENTO, VELOCIDADE MEDIA DIARIA (AUT)(m/s);";

pub fn header(start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "Nome: BRASILIA\n\
         Codigo Estacao: A001\n\
         Latitude: -15.78944444\n\
         Longitude: -47.92583332\n\
         Altitude: 1160.96\n\
         Situacao: Operante\n\
         Data Inicial: {}\n\
         Data Final: {}\n\
         Periodicidade da Medicao: Diaria\n",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}

/// Daily series with a wet season from December to May and a near-dry
/// season from June to November. Each hydrological year gets one storm
/// taken from `peaks`, placed on 15 January.
pub fn seasonal_rows(start: NaiveDate, end: NaiveDate, peaks: &[f64]) -> Vec<(NaiveDate, Option<f64>)> {
    let first_year = start.year();
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(|d| {
            let month = d.month();
            let value = if (6..=11).contains(&month) {
                if d.day() == 15 {
                    0.2 * (month - 5) as f64
                } else {
                    0.0
                }
            } else if month == 1 && d.day() == 15 {
                let idx = (d.year() - first_year - 1).max(0) as usize;
                peaks[idx.min(peaks.len() - 1)]
            } else {
                ((d.day() * 7 + month * 3) % 20) as f64 + 1.0
            };
            (d, Some(value))
        })
        .collect()
}

pub fn export_text(start: NaiveDate, end: NaiveDate, rows: &[(NaiveDate, Option<f64>)]) -> String {
    let mut text = header(start, end);
    text.push_str(TABLE_HEADER);
    text.push('\n');
    for (date, value) in rows {
        let value = value.map(|v| format!("{}", v)).unwrap_or_else(|| "null".to_string());
        text.push_str(&format!("{};{};22.5;81;1.4;\n", date.format("%Y-%m-%d"), value));
    }
    text
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}
