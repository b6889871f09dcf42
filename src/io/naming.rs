//! Output file naming
//!
//! `<location>/abc<x>_<y>/<PLATFORM>_water_<x>_<y>_<timestamp>.<ext>`, e.g.
//! `abc15_-40/LS8_water_15_-40_2013-04-11T23-46-35.385577.tif`

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::config::{Platform, WofsConfig};
use crate::types::{CellIndex, WofsError, WofsResult};

/// Filesystem-safe acquisition timestamp.
///
/// Microsecond resolution when the time has a sub-second part, seconds
/// otherwise. Colons become dashes.
pub fn timestamp(time: &DateTime<Utc>) -> String {
    let text = if time.nanosecond() == 0 {
        time.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        time.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    };
    text.replace(':', "-")
}

fn parse_timestamp(text: &str) -> WofsResult<DateTime<Utc>> {
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (text, None),
    };

    let naive = NaiveDateTime::parse_from_str(whole, "%Y-%m-%dT%H-%M-%S")
        .map_err(|e| WofsError::InvalidFormat(format!("Bad timestamp '{}': {}", text, e)))?;

    let nanos = match fraction {
        Some(digits) if !digits.is_empty() && digits.len() <= 9 => {
            format!("{:0<9}", digits)
                .parse::<u32>()
                .map_err(|e| WofsError::InvalidFormat(format!("Bad fraction '{}': {}", digits, e)))?
        }
        Some(digits) => {
            return Err(WofsError::InvalidFormat(format!("Bad fraction '{}'", digits)));
        }
        None => 0,
    };

    let naive = naive
        .with_nanosecond(nanos)
        .ok_or_else(|| WofsError::InvalidFormat(format!("Bad timestamp '{}'", text)))?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Fields recovered from an output file name
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedName {
    pub platform: Platform,
    pub cell: CellIndex,
    pub time: DateTime<Utc>,
    pub extension: String,
}

/// Deterministic output paths under one root
#[derive(Debug, Clone)]
pub struct OutputNaming {
    location: PathBuf,
    extension: String,
}

impl OutputNaming {
    pub fn new<P: AsRef<Path>>(location: P, extension: &str) -> Self {
        Self {
            location: location.as_ref().to_path_buf(),
            extension: extension.to_string(),
        }
    }

    pub fn from_config(config: &WofsConfig) -> Self {
        Self::new(&config.location, &config.file_extension)
    }

    pub fn cell_dir(&self, cell: CellIndex) -> PathBuf {
        self.location.join(format!("abc{}", cell))
    }

    pub fn file_name(&self, platform: Platform, cell: CellIndex, time: &DateTime<Utc>) -> String {
        format!(
            "{}_water_{}_{}.{}",
            platform.short_name().to_uppercase(),
            cell,
            timestamp(time),
            self.extension
        )
    }

    pub fn path(&self, platform: Platform, cell: CellIndex, time: &DateTime<Utc>) -> PathBuf {
        self.cell_dir(cell).join(self.file_name(platform, cell, time))
    }

    pub fn parse(file_name: &str) -> WofsResult<ParsedName> {
        let pattern = Regex::new(
            r"^(?P<platform>[A-Za-z0-9]+)_water_(?P<x>-?\d+)_(?P<y>-?\d+)_(?P<ts>\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2}(?:\.\d{1,9})?)\.(?P<ext>[A-Za-z0-9]+)$",
        )
        .map_err(|e| WofsError::Processing(format!("Regex error: {}", e)))?;

        let captures = pattern.captures(file_name).ok_or_else(|| {
            WofsError::InvalidFormat(format!("Not a water tile name: {}", file_name))
        })?;

        let coordinate = |name: &str| -> WofsResult<i32> {
            captures[name]
                .parse::<i32>()
                .map_err(|e| WofsError::InvalidFormat(format!("Bad cell index in {}: {}", file_name, e)))
        };

        Ok(ParsedName {
            platform: Platform::parse(&captures["platform"])?,
            cell: CellIndex::new(coordinate("x")?, coordinate("y")?),
            time: parse_timestamp(&captures["ts"])?,
            extension: captures["ext"].to_string(),
        })
    }
}
