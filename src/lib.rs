pub mod cleaner;
pub mod config;
pub mod design_storm;
pub mod error;
pub mod hydro_year;
pub mod models;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod stats;
