use std::path::PathBuf;

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::services::consolidator::{MergeReport, StageReport};
use crate::services::Aggregator;
use crate::types::{Granularity, TimeBucketSeries};

/// Widest bar drawn in the text report
const BAR_WIDTH: u64 = 40;

/// Consolidate Shiny usage logs and report connection counts
#[derive(Parser)]
#[command(name = "shinystats")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.shinystats.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the staging area and canonical store
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every owner's application log stores into the staging area
    Scrape {
        /// Owner to scrape (repeatable, overrides the config list)
        #[arg(long = "owner")]
        owners: Vec<String>,
    },

    /// Merge staged stores into the canonical store
    Combine,

    /// Scrape, then combine (default)
    Consolidate {
        /// Owner to scrape (repeatable, overrides the config list)
        #[arg(long = "owner")]
        owners: Vec<String>,
    },

    /// List owners and their applications
    Apps {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show connection counts for one application
    Stats {
        /// Application name
        #[arg(long)]
        app: String,

        /// Bucket size: hour, day or month
        #[arg(long, default_value_t = Granularity::Hour)]
        granularity: Granularity,

        /// Zero-fill every bucket in the window
        #[arg(long)]
        fill_gaps: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::load(self.config.as_deref()).context("loading config")?;
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        Ok(config)
    }

    pub fn run(self) -> anyhow::Result<()> {
        let mut config = self.load_config()?;

        match self.command {
            Some(Commands::Scrape { owners }) => {
                override_owners(&mut config, owners);
                let sources = config.enumerator().sources(&config.owners);
                let report = config.consolidator().scrape(&sources)?;
                print_stage(&report);
                Ok(())
            }
            Some(Commands::Combine) => {
                let report = config.consolidator().combine()?;
                print_merge(&report);
                Ok(())
            }
            None => consolidate(&config),
            Some(Commands::Consolidate { owners }) => {
                override_owners(&mut config, owners);
                consolidate(&config)
            }
            Some(Commands::Apps { json }) => {
                let apps = config.stats_service().applications()?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&apps)?);
                } else {
                    for (owner, apps) in &apps {
                        println!("{}: {}", owner, apps.join(", "));
                    }
                }
                Ok(())
            }
            Some(Commands::Stats {
                app,
                granularity,
                fill_gaps,
                json,
            }) => {
                let now = Local::now().naive_local();
                let mut series = config
                    .stats_service()
                    .recent_series(&app, granularity, now)?;
                if fill_gaps {
                    series = Aggregator::fill_gaps(&series);
                }
                if json {
                    println!("{}", serde_json::to_string_pretty(&series)?);
                } else {
                    print!("{}", render_series(&series));
                }
                Ok(())
            }
        }
    }
}

fn override_owners(config: &mut Config, owners: Vec<String>) {
    if !owners.is_empty() {
        config.owners = owners;
    }
}

fn consolidate(config: &Config) -> anyhow::Result<()> {
    if config.owners.is_empty() {
        anyhow::bail!("no owners configured; pass --owner or set `owners` in the config file");
    }
    let sources = config.enumerator().sources(&config.owners);
    let report = config.consolidator().consolidate(&sources)?;
    print_stage(&report.stage);
    print_merge(&report.merge);
    Ok(())
}

fn print_stage(report: &StageReport) {
    println!(
        "Staged {} log store(s), {} without logs",
        report.staged.len(),
        report.skipped.len()
    );
}

fn print_merge(report: &MergeReport) {
    if let Some(promoted) = &report.promoted {
        println!(
            "Created canonical store from {} ({} duplicate row(s) dropped)",
            promoted.display(),
            report.promoted_duplicates
        );
    }
    println!(
        "Merged {} store(s), {} new row(s)",
        report.merged.len(),
        report.rows_inserted()
    );
}

/// Text table with one bar per bucket
fn render_series(series: &TimeBucketSeries) -> String {
    let format = match series.granularity {
        Granularity::Hour => "%Y-%m-%d %H:00",
        Granularity::Day => "%Y-%m-%d",
        Granularity::Month => "%Y-%m",
    };
    let max = series.buckets.iter().map(|b| b.count).max().unwrap_or(0);

    let mut out = format!("{}\n", series.title());
    out.push_str(&format!(
        "{:<16} {:>11}\n",
        series.granularity.axis_label(),
        "Connections"
    ));
    for bucket in &series.buckets {
        let bar = if max == 0 {
            0
        } else {
            (bucket.count * BAR_WIDTH).div_ceil(max)
        };
        out.push_str(&format!(
            "{:<16} {:>11} {}\n",
            bucket.start.format(format).to_string(),
            bucket.count,
            "#".repeat(bar as usize)
        ));
    }
    out
}
