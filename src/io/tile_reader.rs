use gdal::{Dataset, Metadata};
use ndarray::Array2;
use std::path::Path;

use crate::core::pixel_quality::PixelQuality;
use crate::core::reflectance::{Reflectance, ReflectanceBand, SpectralBand};
use crate::types::{FlagRaster, GeoTransform, TileGeometry, WofsError, WofsResult};

/// GDAL-backed reader for the per-tile input rasters
pub struct TileReader;

impl TileReader {
    /// Read a six-band reflectance tile.
    ///
    /// Bands are matched by description (`blue`, `green`, ...). Without
    /// descriptions a six-band file is taken to be in canonical order. Each
    /// band keeps its own declared no-data value.
    pub fn read_reflectance<P: AsRef<Path>>(path: P) -> WofsResult<(Reflectance, TileGeometry)> {
        log::info!("Reading reflectance tile: {}", path.as_ref().display());

        let dataset = Dataset::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        let count = dataset.raster_count();
        log::debug!("Reflectance size: {}x{}, {} bands", width, height, count);

        let mut described = Vec::new();
        for index in 1..=count {
            let band = dataset.rasterband(index)?;
            described.push(SpectralBand::from_name(&band.description().unwrap_or_default()));
        }

        let assignments: Vec<(isize, SpectralBand)> = if described.iter().any(Option::is_some) {
            described
                .iter()
                .enumerate()
                .filter_map(|(i, band)| band.map(|b| (i as isize + 1, b)))
                .collect()
        } else if count == SpectralBand::ALL.len() as isize {
            log::debug!("No band descriptions, assuming canonical band order");
            SpectralBand::ALL
                .iter()
                .enumerate()
                .map(|(i, &b)| (i as isize + 1, b))
                .collect()
        } else {
            return Err(WofsError::InvalidFormat(format!(
                "Cannot identify spectral bands of {}-band file {}",
                count,
                path.as_ref().display()
            )));
        };

        let mut bands = Vec::with_capacity(assignments.len());
        for (index, spectral) in assignments {
            let band = dataset.rasterband(index)?;
            let nodata = band.no_data_value();
            if nodata.is_none() {
                log::warn!("Band {} ({}) declares no no-data value", index, spectral);
            }
            let buffer = band.read_as::<i16>((0, 0), (width, height), (width, height), None)?;
            let data = Array2::from_shape_vec((height, width), buffer.data)
                .map_err(|e| WofsError::Processing(format!("Failed to reshape band {}: {}", spectral, e)))?;
            bands.push(ReflectanceBand::new(spectral, data, nodata));
        }

        let reflectance = Reflectance::new(bands)?;
        reflectance.require_all()?;
        Ok((reflectance, Self::geometry(&dataset)?))
    }

    /// Read band 1 of a legacy pixel-quality tile
    pub fn read_pixel_quality<P: AsRef<Path>>(path: P) -> WofsResult<(PixelQuality, TileGeometry)> {
        log::info!("Reading pixel-quality tile: {}", path.as_ref().display());

        let dataset = Dataset::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        let band = dataset.rasterband(1)?;
        let buffer = band.read_as::<u16>((0, 0), (width, height), (width, height), None)?;
        let data = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| WofsError::Processing(format!("Failed to reshape pixel quality: {}", e)))?;

        Ok((PixelQuality::new(data), Self::geometry(&dataset)?))
    }

    /// Read an emitted flag raster back
    pub fn read_flags<P: AsRef<Path>>(path: P) -> WofsResult<(FlagRaster, TileGeometry)> {
        let dataset = Dataset::open(path.as_ref())?;
        let (width, height) = dataset.raster_size();
        let band = dataset.rasterband(1)?;
        let buffer = band.read_as::<u8>((0, 0), (width, height), (width, height), None)?;
        let data = Array2::from_shape_vec((height, width), buffer.data)
            .map_err(|e| WofsError::Processing(format!("Failed to reshape flags: {}", e)))?;

        Ok((data, Self::geometry(&dataset)?))
    }

    fn geometry(dataset: &Dataset) -> WofsResult<TileGeometry> {
        let geo_transform = GeoTransform::from_gdal(dataset.geo_transform()?);
        let epsg = dataset
            .spatial_ref()
            .ok()
            .and_then(|srs| srs.auth_code().ok())
            .and_then(|code| u32::try_from(code).ok())
            .unwrap_or_else(|| {
                log::debug!("No EPSG code on dataset, assuming grid default");
                TileGeometry::default().epsg
            });
        Ok(TileGeometry { geo_transform, epsg })
    }
}
