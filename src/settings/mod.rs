use clap::{Parser, value_parser};
use log::trace;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(name = "Lodestar")]
#[command(version = concat!(env!("VERGEN_GIT_BRANCH"), "/",env!("VERGEN_GIT_SHA")))]
#[command(about = "Fetches, decodes and caches engine resources")]
pub struct CliArgs {
    #[arg(long, env = "LODESTAR_DATA_DIR", default_value_t = default_data_dir())]
    pub data_dir: String,

    /// Maps a resource prefix to a directory below the data dir, e.g. `res=./data`. Can be repeated.
    #[arg(long = "prefix", value_parser = value_parser!(PrefixMapping))]
    pub prefixes: Vec<PrefixMapping>,

    /// JSON file with scheduler settings. Values passed on the command line take precedence.
    #[arg(long, env = "LODESTAR_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Seconds per tick that may be spent on decoding.
    #[arg(long)]
    pub max_prepare_time: Option<f64>,

    /// Age in purge cadence frames after which unused resources are evicted.
    #[arg(long)]
    pub purge_time: Option<u64>,

    #[arg(long)]
    pub no_auto_purge: bool,

    /// Simulated seconds per tick.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    pub frame_time: f64,

    /// Give up after this many ticks if resources are still loading.
    #[arg(long, default_value_t = 3600)]
    pub max_ticks: u32,

    /// Resource paths to load, e.g. `res:/fx/glow.sm_hi`.
    pub paths: Vec<String>,
}

pub fn default_data_dir() -> String {
    std::env::current_dir()
        .map(|dir| dir.join("_data").to_string_lossy().to_string())
        .unwrap_or_else(|_| "_data".to_string())
}

/// `name=directory`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMapping {
    pub prefix: String,
    pub directory: String,
}

impl FromStr for PrefixMapping {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, directory) = s
            .split_once('=')
            .ok_or_else(|| format!("Expected name=directory, got \"{}\"", s))?;

        let prefix = prefix.trim().trim_end_matches(":/").trim_end_matches(':');
        if prefix.is_empty() {
            return Err("The prefix name must not be empty".to_string());
        }

        Ok(PrefixMapping {
            prefix: prefix.to_lowercase(),
            directory: directory.trim().to_string(),
        })
    }
}

/// Tuning of the resource scheduler. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub max_prepare_time: f64,
    pub auto_purge: bool,
    /// In purge cadence frames, which advance about once per second.
    pub purge_time: u64,
    pub purge_frame_limit: usize,
    pub max_watched_update_time: f64,
    /// 0 means no limit.
    pub max_watched_count: usize,
    pub max_watched_time: f64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_prepare_time: 0.05,
            auto_purge: true,
            purge_time: 30,
            purge_frame_limit: 1000,
            max_watched_update_time: 0.05,
            max_watched_count: 0,
            max_watched_time: 240.0,
        }
    }
}

impl SchedulerSettings {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Reads the settings file named by the arguments (if any) and applies the overrides of
    /// the command line on top.
    pub fn load(args: &CliArgs) -> anyhow::Result<Self> {
        let base = match &args.settings {
            Some(path) => {
                trace!("Reading scheduler settings from {}", path.display());
                SchedulerSettings::from_json(&fs::read_to_string(path)?)?
            }
            None => SchedulerSettings::default(),
        };

        Ok(base.with_overrides(args))
    }

    fn with_overrides(mut self, args: &CliArgs) -> Self {
        if let Some(max_prepare_time) = args.max_prepare_time {
            self.max_prepare_time = max_prepare_time;
        }
        if let Some(purge_time) = args.purge_time {
            self.purge_time = purge_time;
        }
        if args.no_auto_purge {
            self.auto_purge = false;
        }
        self
    }
}

impl From<&CliArgs> for SchedulerSettings {
    fn from(args: &CliArgs) -> Self {
        SchedulerSettings::default().with_overrides(args)
    }
}
