//! Six-band surface reflectance tile

use serde::{Deserialize, Serialize};

use crate::types::{ensure_shape, ReflectanceImage, WofsError, WofsResult};

/// Spectral bands consumed by the water classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectralBand {
    Blue,
    Green,
    Red,
    Nir,
    Swir1,
    Swir2,
}

impl SpectralBand {
    /// Canonical band order of the NBAR products
    pub const ALL: [SpectralBand; 6] = [
        SpectralBand::Blue,
        SpectralBand::Green,
        SpectralBand::Red,
        SpectralBand::Nir,
        SpectralBand::Swir1,
        SpectralBand::Swir2,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SpectralBand::Blue => "blue",
            SpectralBand::Green => "green",
            SpectralBand::Red => "red",
            SpectralBand::Nir => "nir",
            SpectralBand::Swir1 => "swir1",
            SpectralBand::Swir2 => "swir2",
        }
    }

    pub fn from_name(name: &str) -> Option<SpectralBand> {
        let lower = name.trim().to_lowercase();
        Self::ALL.iter().copied().find(|band| band.name() == lower)
    }
}

impl std::fmt::Display for SpectralBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One band with its own declared no-data sentinel
#[derive(Debug, Clone)]
pub struct ReflectanceBand {
    pub band: SpectralBand,
    pub data: ReflectanceImage,
    pub nodata: Option<f64>,
}

impl ReflectanceBand {
    pub fn new(band: SpectralBand, data: ReflectanceImage, nodata: Option<f64>) -> Self {
        Self { band, data, nodata }
    }

    pub fn sentinel(&self) -> WofsResult<f64> {
        self.nodata.ok_or_else(|| WofsError::MissingSentinel {
            band: self.band.name().to_string(),
        })
    }
}

/// Reflectance tile; every band shares one shape
#[derive(Debug, Clone)]
pub struct Reflectance {
    bands: Vec<ReflectanceBand>,
    dim: (usize, usize),
}

impl Reflectance {
    pub fn new(bands: Vec<ReflectanceBand>) -> WofsResult<Self> {
        let first = bands
            .first()
            .ok_or_else(|| WofsError::InvalidFormat("Reflectance tile has no bands".to_string()))?;
        let dim = first.data.dim();

        for band in &bands {
            ensure_shape(&format!("reflectance band {}", band.band), dim, band.data.dim())?;
        }

        for (i, band) in bands.iter().enumerate() {
            if bands[..i].iter().any(|other| other.band == band.band) {
                return Err(WofsError::InvalidFormat(format!(
                    "Band {} appears more than once",
                    band.band
                )));
            }
        }

        Ok(Self { bands, dim })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn bands(&self) -> &[ReflectanceBand] {
        &self.bands
    }

    pub fn band(&self, band: SpectralBand) -> WofsResult<&ReflectanceBand> {
        self.bands
            .iter()
            .find(|b| b.band == band)
            .ok_or_else(|| WofsError::MissingBand(band.name().to_string()))
    }

    /// Check all six classifier inputs are present
    pub fn require_all(&self) -> WofsResult<()> {
        for band in SpectralBand::ALL {
            self.band(band)?;
        }
        Ok(())
    }
}
