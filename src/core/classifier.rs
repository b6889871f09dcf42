//! Raw water classification
//!
//! The fusion core only needs a wet/dry raster. Any model that produces one
//! from a reflectance tile can be plugged in through [`WaterClassifier`].

use ndarray::Zip;
use serde::{Deserialize, Serialize};

use crate::core::flags::WaterFlag;
use crate::core::reflectance::{Reflectance, SpectralBand};
use crate::types::{FlagRaster, WofsError, WofsResult};

/// Black-box wet/dry classifier.
///
/// Implementations must return a raster of the reflectance tile's shape
/// holding only `WATER_NOT_PRESENT` and `WATER_PRESENT`.
pub trait WaterClassifier: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, reflectance: &Reflectance) -> WofsResult<FlagRaster>;
}

/// Reject classifier output that is not a pure wet/dry raster
pub fn check_classification(raw: &FlagRaster, expected: (usize, usize)) -> WofsResult<()> {
    crate::types::ensure_shape("raw classification", expected, raw.dim())?;

    let dry = WaterFlag::WaterNotPresent.value();
    let wet = WaterFlag::WaterPresent.value();
    if let Some(bad) = raw.iter().find(|&&v| v != dry && v != wet) {
        return Err(WofsError::InvalidFormat(format!(
            "Raw classification contains code {}, expected {} or {}",
            bad, dry, wet
        )));
    }
    Ok(())
}

/// Parameters of the normalised-difference classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MndwiParams {
    /// Cells with MNDWI above this are wet
    pub threshold: f32,
}

impl Default for MndwiParams {
    fn default() -> Self {
        Self { threshold: 0.0 }
    }
}

/// Modified normalised difference water index, (green - swir1) / (green + swir1)
#[derive(Debug, Clone, Default)]
pub struct MndwiClassifier {
    params: MndwiParams,
}

impl MndwiClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: MndwiParams) -> Self {
        Self { params }
    }

    fn classify_pixel(green: i16, swir1: i16, threshold: f32) -> u8 {
        let green = green as f32;
        let swir1 = swir1 as f32;
        let sum = green + swir1;
        if sum == 0.0 {
            return WaterFlag::WaterNotPresent.value();
        }
        if (green - swir1) / sum > threshold {
            WaterFlag::WaterPresent.value()
        } else {
            WaterFlag::WaterNotPresent.value()
        }
    }
}

impl WaterClassifier for MndwiClassifier {
    fn name(&self) -> &str {
        "mndwi"
    }

    fn classify(&self, reflectance: &Reflectance) -> WofsResult<FlagRaster> {
        let green = &reflectance.band(SpectralBand::Green)?.data;
        let swir1 = &reflectance.band(SpectralBand::Swir1)?.data;
        let threshold = self.params.threshold;

        log::debug!("Classifying {:?} tile with MNDWI > {}", reflectance.dim(), threshold);

        #[cfg(feature = "parallel")]
        let raw = Zip::from(green)
            .and(swir1)
            .par_map_collect(|&g, &s| Self::classify_pixel(g, s, threshold));
        #[cfg(not(feature = "parallel"))]
        let raw = Zip::from(green)
            .and(swir1)
            .map_collect(|&g, &s| Self::classify_pixel(g, s, threshold));

        Ok(raw)
    }
}
