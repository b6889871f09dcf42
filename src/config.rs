//! Application configuration

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::masks::CloudAgreement;
use crate::types::{WofsError, WofsResult};

pub const APP_NAME: &str = "wofs";

/// Landsat platforms with a supported reflectance and pixel-quality product pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "LANDSAT-5", alias = "ls5")]
    Landsat5,
    #[serde(rename = "LANDSAT-7", alias = "ls7")]
    Landsat7,
    #[serde(rename = "LANDSAT-8", alias = "ls8")]
    Landsat8,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Landsat5, Platform::Landsat7, Platform::Landsat8];

    pub fn platform_name(self) -> &'static str {
        match self {
            Platform::Landsat5 => "LANDSAT-5",
            Platform::Landsat7 => "LANDSAT-7",
            Platform::Landsat8 => "LANDSAT-8",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Platform::Landsat5 => "ls5",
            Platform::Landsat7 => "ls7",
            Platform::Landsat8 => "ls8",
        }
    }

    pub fn sensor_name(self) -> &'static str {
        match self {
            Platform::Landsat5 => "TM",
            Platform::Landsat7 => "ETM",
            Platform::Landsat8 => "OLI",
        }
    }

    /// Accepts `LANDSAT-8`, `LANDSAT_8`, `ls8` or `LS8`
    pub fn parse(name: &str) -> WofsResult<Platform> {
        let normalised = name.trim().to_uppercase().replace('_', "-");
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.platform_name() == normalised || p.short_name().to_uppercase() == normalised)
            .ok_or_else(|| WofsError::Config(format!("Unknown platform: {}", name)))
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.platform_name())
    }
}

/// Inclusive range of calendar years
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub first_year: i32,
    pub last_year: i32,
}

impl TimeRange {
    /// `"1996"` or `"1996-2001"`
    pub fn parse(value: &str) -> WofsResult<TimeRange> {
        let invalid = || {
            WofsError::Config(format!(
                "year must be a single year (eg 1996) or an inclusive range (eg 1996-2001), got '{}'",
                value
            ))
        };

        let years = value
            .split('-')
            .map(|part| part.trim().parse::<i32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        match years.as_slice() {
            [year] => Ok(TimeRange { first_year: *year, last_year: *year }),
            [first, last] if first <= last => Ok(TimeRange { first_year: *first, last_year: *last }),
            _ => Err(invalid()),
        }
    }

    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        (self.first_year..=self.last_year).contains(&time.year())
    }
}

/// Processing configuration, usually loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WofsConfig {
    /// Root directory of the emitted water tiles
    pub location: PathBuf,
    pub file_extension: String,
    pub cloud_agreement: CloudAgreement,
    /// Insert the sea-water mask just before no-data
    pub mask_sea_water: bool,
    /// GeoTIFF compression, e.g. "DEFLATE"
    pub compression: Option<String>,
    pub global_attributes: BTreeMap<String, String>,
    pub algorithm_version: String,
    pub repo_url: String,
    /// Reported in lineage when loaded from a file
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

impl Default for WofsConfig {
    fn default() -> Self {
        let location = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME)
            .join("extents");

        let mut global_attributes = BTreeMap::new();
        global_attributes.insert("title".to_string(), "Water Observations from Space".to_string());
        global_attributes.insert("product_version".to_string(), "2".to_string());

        Self {
            location,
            file_extension: "tif".to_string(),
            cloud_agreement: CloudAgreement::Either,
            mask_sea_water: false,
            compression: Some("DEFLATE".to_string()),
            global_attributes,
            algorithm_version: env!("CARGO_PKG_VERSION").to_string(),
            repo_url: "https://github.com/GeoscienceAustralia/wofs.git".to_string(),
            config_file: None,
        }
    }
}

impl WofsConfig {
    pub fn from_json(text: &str) -> WofsResult<Self> {
        let config: WofsConfig = serde_json::from_str(text)
            .map_err(|e| WofsError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> WofsResult<Self> {
        let path = path.as_ref();
        log::info!("Loading configuration from {}", path.display());

        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&text)?;
        config.config_file = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn validate(&self) -> WofsResult<()> {
        if self.file_extension.is_empty()
            || !self.file_extension.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(WofsError::Config(format!(
                "file_extension must be alphanumeric, got '{}'",
                self.file_extension
            )));
        }
        Ok(())
    }

    /// Warn when the output root is not writable. Processing still proceeds.
    pub fn check_location(&self) {
        match std::fs::metadata(&self.location) {
            Ok(meta) if meta.permissions().readonly() => {
                log::warn!(
                    "Current user appears not to have write access to output location: {}",
                    self.location.display()
                );
            }
            Ok(_) => {}
            Err(_) => log::debug!("Output location {} will be created", self.location.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_range_parse() {
        assert_eq!(
            TimeRange::parse("1996").unwrap(),
            TimeRange { first_year: 1996, last_year: 1996 }
        );
        assert_eq!(
            TimeRange::parse("1996-2001").unwrap(),
            TimeRange { first_year: 1996, last_year: 2001 }
        );
        assert!(TimeRange::parse("2001-1996").is_err());
        assert!(TimeRange::parse("nineteen").is_err());
        assert!(TimeRange::parse("1996-1997-1998").is_err());
    }

    #[test]
    fn test_time_range_contains() {
        let range = TimeRange::parse("1990-1991").unwrap();
        assert!(range.contains(&Utc.with_ymd_and_hms(1990, 3, 2, 23, 11, 5).unwrap()));
        assert!(range.contains(&Utc.with_ymd_and_hms(1991, 12, 31, 23, 59, 59).unwrap()));
        assert!(!range.contains(&Utc.with_ymd_and_hms(1992, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!(Platform::parse("LANDSAT_8").unwrap(), Platform::Landsat8);
        assert_eq!(Platform::parse("ls5").unwrap(), Platform::Landsat5);
        assert_eq!(Platform::parse("LANDSAT-7").unwrap().sensor_name(), "ETM");
        assert!(Platform::parse("SENTINEL-2").is_err());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config = WofsConfig::from_json(
            r#"{"location": "/tmp/wofs", "cloud_agreement": "both", "mask_sea_water": true}"#,
        )
        .unwrap();
        assert_eq!(config.location, PathBuf::from("/tmp/wofs"));
        assert_eq!(config.cloud_agreement, CloudAgreement::Both);
        assert!(config.mask_sea_water);
        assert_eq!(config.file_extension, "tif");
    }

    #[test]
    fn test_config_rejects_bad_extension() {
        assert!(WofsConfig::from_json(r#"{"file_extension": "../nc"}"#).is_err());
        assert!(WofsConfig::from_json(r#"{"mask_sea_water": "yes"}"#).is_err());
    }
}
