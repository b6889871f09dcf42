use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Single-byte-per-pixel water flag raster (rows x cols)
pub type FlagRaster = Array2<u8>;

/// Boolean quality-condition raster, true where the condition holds
pub type MaskRaster = Array2<bool>;

/// Surface reflectance sample as delivered by the NBAR products
pub type ReflectanceValue = i16;

/// 2D reflectance band (rows x cols)
pub type ReflectanceImage = Array2<ReflectanceValue>;

/// Legacy pixel-quality bitfield raster
pub type PqImage = Array2<u16>;

/// Spatial cell index on the tiling grid (x, y)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIndex {
    pub x: i32,
    pub y: i32,
}

impl CellIndex {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for CellIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.x, self.y)
    }
}

/// Axis-aligned extent in the projected coordinates of the tiling grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, max_x, min_y, max_y }
    }

    pub fn is_empty(&self) -> bool {
        self.max_x <= self.min_x || self.max_y <= self.min_y
    }

    pub fn area(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            (self.max_x - self.min_x) * (self.max_y - self.min_y)
        }
    }

    /// Overlap of two extents, `None` when they do not share any area
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let overlap = BoundingBox {
            min_x: self.min_x.max(other.min_x),
            max_x: self.max_x.min(other.max_x),
            min_y: self.min_y.max(other.min_y),
            max_y: self.max_y.min(other.max_y),
        };
        if overlap.is_empty() {
            None
        } else {
            Some(overlap)
        }
    }

    /// Closed polygon ring in WKT, counter-clockwise from the lower-left corner
    pub fn to_wkt(&self) -> String {
        format!(
            "POLYGON(({x0} {y0}, {x1} {y0}, {x1} {y1}, {x0} {y1}, {x0} {y0}))",
            x0 = self.min_x,
            y0 = self.min_y,
            x1 = self.max_x,
            y1 = self.max_y,
        )
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Footprint of a north-up raster with the given shape
    pub fn extent(&self, rows: usize, cols: usize) -> BoundingBox {
        let x0 = self.top_left_x;
        let x1 = self.top_left_x + self.pixel_width * cols as f64;
        let y0 = self.top_left_y;
        let y1 = self.top_left_y + self.pixel_height * rows as f64;
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

/// Georeferencing shared by every raster of one tile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileGeometry {
    pub geo_transform: GeoTransform,
    pub epsg: u32,
}

impl Default for TileGeometry {
    fn default() -> Self {
        // Australian Albers, 25 m cells, 100 km tiles
        Self {
            geo_transform: GeoTransform {
                top_left_x: 0.0,
                pixel_width: 25.0,
                rotation_x: 0.0,
                top_left_y: 0.0,
                rotation_y: 0.0,
                pixel_height: -25.0,
            },
            epsg: 3577,
        }
    }
}

/// Error types for water observation processing
#[derive(Debug, thiserror::Error)]
pub enum WofsError {
    #[error("Shape mismatch for {what}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        what: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Histogram inconsistency: counted {counted} of {expected} pixels ({unrecognized} carry unrecognised codes)")]
    Consistency {
        counted: usize,
        expected: usize,
        unrecognized: usize,
    },

    #[error("Band '{band}' does not declare a no-data value")]
    MissingSentinel { band: String },

    #[error("Required band missing: {0}")]
    MissingBand(String),

    #[error("Output already exists: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for water observation operations
pub type WofsResult<T> = Result<T, WofsError>;

/// Fail with `ShapeMismatch` unless `found` matches the reference shape
pub fn ensure_shape(what: &str, expected: (usize, usize), found: (usize, usize)) -> WofsResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(WofsError::ShapeMismatch {
            what: what.to_string(),
            expected,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_intersection() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, -5.0, 15.0, 5.0);
        let overlap = a.intersection(&b).unwrap();
        assert_eq!(overlap, BoundingBox::new(5.0, 0.0, 10.0, 5.0));
        assert_eq!(overlap.area(), 25.0);

        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert!(a.intersection(&c).is_none());
    }

    #[test]
    fn test_geotransform_extent() {
        let gt = GeoTransform::from_gdal([1_500_000.0, 25.0, 0.0, -4_000_000.0, 0.0, -25.0]);
        let extent = gt.extent(4000, 4000);
        assert_eq!(extent.min_x, 1_500_000.0);
        assert_eq!(extent.max_x, 1_600_000.0);
        assert_eq!(extent.min_y, -4_100_000.0);
        assert_eq!(extent.max_y, -4_000_000.0);
        assert_eq!(gt.to_gdal()[5], -25.0);
    }

    #[test]
    fn test_ensure_shape() {
        assert!(ensure_shape("mask", (2, 2), (2, 2)).is_ok());
        match ensure_shape("mask", (2, 2), (2, 3)) {
            Err(WofsError::ShapeMismatch { what, expected, found }) => {
                assert_eq!(what, "mask");
                assert_eq!(expected, (2, 2));
                assert_eq!(found, (2, 3));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
