use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use clap::{Parser, Subcommand, ValueEnum};
use playback_engine::{AbsoluteTime, Direction};

const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Parser)]
#[command(name = "playback")]
#[command(about = "Inspect and replay recorded screen history")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List indexed segments and the gaps between them
    Segments {
        /// Only segments ending after this time
        #[arg(long, value_parser = parse_time)]
        from: Option<AbsoluteTime>,

        /// Only segments starting before this time
        #[arg(long, value_parser = parse_time)]
        to: Option<AbsoluteTime>,
    },

    /// Map a timeline point onto a segment and video offset
    Resolve {
        /// Epoch seconds or "YYYY-MM-DD HH:MM:SS" local time
        #[arg(value_parser = parse_time)]
        time: AbsoluteTime,

        /// Bias used when the time falls into a gap
        #[arg(short, long, value_enum, default_value_t = DirectionArg::None)]
        direction: DirectionArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show aggregate numbers for the metadata database
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode the frame shown at a timeline point into a PNG
    Still {
        #[arg(value_parser = parse_time)]
        time: AbsoluteTime,

        /// Output image path
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Run a headless session from a timeline point and log its events
    Replay {
        #[arg(value_parser = parse_time)]
        time: AbsoluteTime,

        /// How long to keep the session running
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DirectionArg {
    Forward,
    Backward,
    None,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Forward => Direction::Forward,
            DirectionArg::Backward => Direction::Backward,
            DirectionArg::None => Direction::Still,
        }
    }
}

/// Parses epoch seconds or a local `YYYY-MM-DD HH:MM:SS` timestamp.
pub fn parse_time(input: &str) -> Result<AbsoluteTime, String> {
    let input = input.trim();
    if let Ok(seconds) = input.parse::<f64>() {
        if seconds.is_finite() {
            return Ok(seconds);
        }
        return Err(format!("time must be finite: {input}"));
    }

    let naive = NaiveDateTime::parse_from_str(input, LOCAL_TIME_FORMAT)
        .map_err(|_| format!("expected epoch seconds or \"YYYY-MM-DD HH:MM:SS\", got {input:?}"))?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| format!("{input:?} does not exist in the local time zone"))?;
    Ok(local.timestamp() as f64)
}

/// Formats an absolute time in local time, keeping millisecond precision.
pub fn format_time(ts: AbsoluteTime) -> String {
    let millis = (ts * 1000.0).round() as i64;
    match DateTime::from_timestamp_millis(millis) {
        Some(utc) => utc.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => format!("{ts:.3}"),
    }
}
