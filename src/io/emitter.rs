use gdal::raster::{Buffer, RasterCreationOption};
use gdal::spatial_ref::SpatialRef;
use gdal::{DriverManager, Metadata};
use std::path::{Path, PathBuf};

use crate::core::flags::WaterFlag;
use crate::core::provenance::DatasetRecord;
use crate::types::{FlagRaster, TileGeometry, WofsError, WofsResult};

/// Prefix of the partial files written before an output is complete
const STAGING_PREFIX: &str = ".wofs-partial-";

/// Serializes a frozen flag raster with its provenance
pub trait RasterEmitter: Send + Sync {
    fn emit(
        &self,
        flags: &FlagRaster,
        geometry: &TileGeometry,
        record: &DatasetRecord,
        path: &Path,
    ) -> WofsResult<PathBuf>;
}

/// Single-band `u8` GeoTIFF plus a JSON sidecar holding the dataset record
#[derive(Debug, Clone, Default)]
pub struct GeoTiffEmitter {
    compression: Option<String>,
}

impl GeoTiffEmitter {
    pub fn new(compression: Option<String>) -> Self {
        Self { compression }
    }

    pub fn sidecar_path(path: &Path) -> PathBuf {
        path.with_extension("json")
    }
}

impl GeoTiffEmitter {
    fn write_raster(
        &self,
        path: &Path,
        flags: &FlagRaster,
        geometry: &TileGeometry,
        record: &DatasetRecord,
    ) -> WofsResult<()> {
        let (height, width) = flags.dim();

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut options = vec![RasterCreationOption { key: "TILED", value: "YES" }];
        if let Some(compression) = &self.compression {
            options.push(RasterCreationOption { key: "COMPRESS", value: compression });
        }

        let mut dataset = driver.create_with_band_type_with_options::<u8, _>(
            path,
            width as isize,
            height as isize,
            1,
            &options,
        )?;

        dataset.set_geo_transform(&geometry.geo_transform.to_gdal())?;
        dataset.set_spatial_ref(&SpatialRef::from_epsg(geometry.epsg)?)?;

        dataset.set_metadata_item("id", &record.id, "")?;
        dataset.set_metadata_item("product", &record.product, "")?;
        dataset.set_metadata_item("center_time", &record.center_time.to_rfc3339(), "")?;
        dataset.set_metadata_item("sources", &record.sources.all().join(","), "")?;
        if let Some(valid) = &record.valid_data {
            dataset.set_metadata_item("valid_data", &valid.to_wkt(), "")?;
        }
        for (key, value) in &record.global_attributes {
            dataset.set_metadata_item(key, value, "")?;
        }

        let mut band = dataset.rasterband(1)?;
        let buffer = Buffer::new((width, height), flags.iter().copied().collect::<Vec<u8>>());
        band.write((0, 0), (width, height), &buffer)?;
        // lest readers default to zero, which means clear and dry
        band.set_no_data_value(Some(WaterFlag::NoData.value() as f64))?;
        band.set_metadata_item("name", "water", "")?;
        band.set_metadata_item("units", &record.units, "")?;

        Ok(())
    }
}

impl RasterEmitter for GeoTiffEmitter {
    /// Both files are staged next to the output and only moved into place
    /// once complete. A failure leaves neither behind.
    fn emit(
        &self,
        flags: &FlagRaster,
        geometry: &TileGeometry,
        record: &DatasetRecord,
        path: &Path,
    ) -> WofsResult<PathBuf> {
        if path.exists() {
            return Err(WofsError::OutputExists(path.to_path_buf()));
        }
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)?;

        let (height, width) = flags.dim();
        log::info!("Writing {}x{} water tile to {}", height, width, path.display());

        let raster = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".tif")
            .tempfile_in(&parent)?;
        self.write_raster(raster.path(), flags, geometry, record)?;

        let sidecar = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".json")
            .tempfile_in(&parent)?;
        record.save_to_file(sidecar.path(), "json")?;

        // claims the name; a concurrent writer of the same tile loses here
        raster.persist_noclobber(path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                WofsError::OutputExists(path.to_path_buf())
            } else {
                WofsError::Io(e.error)
            }
        })?;

        let sidecar_path = Self::sidecar_path(path);
        if let Err(e) = sidecar.persist(&sidecar_path) {
            log::error!("Failed to place {}: {}", sidecar_path.display(), e.error);
            if let Err(cleanup) = std::fs::remove_file(path) {
                log::warn!("Could not remove {}: {}", path.display(), cleanup);
            }
            return Err(WofsError::Io(e.error));
        }

        Ok(path.to_path_buf())
    }
}
