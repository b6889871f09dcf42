//! wofs: Water Observations from Space flag fusion
//!
//! Turns a raw per-pixel water classification and a set of quality masks
//! into a single-band flag raster, following a fixed precedence order, and
//! emits it as a GeoTIFF with provenance.

pub mod types;
pub mod config;
pub mod core;
pub mod io;
pub mod workflow;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, CellIndex, FlagRaster, GeoTransform, MaskRaster, TileGeometry, WofsError,
    WofsResult,
};
pub use config::{Platform, TimeRange, WofsConfig};
pub use crate::core::{
    FusionEngine, FusionStep, MaskKind, MaskProvider, MndwiClassifier, PixelHistogram, PrecedenceChain,
    TileInputs, WaterClassifier, WaterFlag, WaterTilePipeline,
};
pub use io::{GeoTiffEmitter, OutputNaming, RasterEmitter, TileReader};
pub use workflow::{BatchReport, TileProcessor, TileTask};

#[cfg(feature = "python")]
mod python {
    use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
    use pyo3::prelude::*;
    use std::collections::BTreeMap;

    use crate::core::flags::WaterFlag;
    use crate::core::fusion::{FusionEngine, FusionStep};
    use crate::core::histogram::validate_flags;
    use crate::types::MaskRaster;

    fn to_py_err(e: crate::types::WofsError) -> PyErr {
        PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e))
    }

    /// Fuse `masks` into `raw`; `codes[i]` is written where `masks[i]` holds
    #[pyfunction]
    fn fuse_flags<'py>(
        py: Python<'py>,
        raw: PyReadonlyArray2<u8>,
        masks: Vec<PyReadonlyArray2<bool>>,
        codes: Vec<u8>,
    ) -> PyResult<&'py PyArray2<u8>> {
        if masks.len() != codes.len() {
            return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(format!(
                "{} masks but {} codes",
                masks.len(),
                codes.len()
            )));
        }

        let flags = codes
            .iter()
            .map(|&code| {
                WaterFlag::try_from(code).map_err(|v| {
                    PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("Invalid flag code: {}", v))
                })
            })
            .collect::<PyResult<Vec<_>>>()?;
        let masks: Vec<MaskRaster> = masks.iter().map(|m| m.as_array().to_owned()).collect();
        let steps: Vec<FusionStep<'_>> = masks
            .iter()
            .zip(&flags)
            .map(|(mask, flag)| FusionStep::new(flag.name(), mask, *flag))
            .collect();

        let fused = FusionEngine::fuse(&raw.as_array().to_owned(), &steps).map_err(to_py_err)?;
        Ok(fused.into_pyarray(py))
    }

    /// Per-code pixel counts; raises if any cell holds an unknown code
    #[pyfunction]
    fn flag_histogram(flags: PyReadonlyArray2<u8>) -> PyResult<BTreeMap<String, usize>> {
        let histogram = validate_flags(&flags.as_array().to_owned()).map_err(to_py_err)?;
        Ok(histogram.to_map())
    }

    #[pymodule]
    fn wofs(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(fuse_flags, m)?)?;
        m.add_function(wrap_pyfunction!(flag_histogram, m)?)?;
        Ok(())
    }
}
