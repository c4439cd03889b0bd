//! Consolidates per-application shinylogs stores into one canonical SQLite
//! store and reports hourly, daily and monthly connection counts.

pub mod cli;
pub mod config;
pub mod parsers;
pub mod services;
pub mod types;
