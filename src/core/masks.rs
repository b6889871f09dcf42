//! Quality mask providers
//!
//! Each provider derives one boolean raster from its own inputs and has no
//! dependency on any other provider, so a tile's masks can be computed in
//! parallel before fusion starts.

use ndarray::{ArrayView2, Zip};
use num_traits::NumCast;
use serde::{Deserialize, Serialize};

use crate::core::flags::WaterFlag;
use crate::core::pipeline::TileInputs;
use crate::core::pixel_quality::{PixelQuality, PqFlag};
use crate::core::reflectance::Reflectance;
use crate::types::{ensure_shape, MaskRaster, WofsResult};

/// Quality conditions that can claim a cell of the flag raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskKind {
    NonContiguity,
    Cloud,
    CloudShadow,
    SeaWater,
    TerrainShadow,
    HighSlope,
    NoData,
}

impl MaskKind {
    /// Code written where this mask holds
    pub fn flag(self) -> WaterFlag {
        match self {
            MaskKind::NonContiguity => WaterFlag::MaskedNoContiguity,
            MaskKind::Cloud => WaterFlag::MaskedCloud,
            MaskKind::CloudShadow => WaterFlag::MaskedCloudShadow,
            MaskKind::SeaWater => WaterFlag::MaskedSeaWater,
            MaskKind::TerrainShadow => WaterFlag::MaskedTerrainShadow,
            MaskKind::HighSlope => WaterFlag::MaskedHighSlope,
            MaskKind::NoData => WaterFlag::NoData,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MaskKind::NonContiguity => "non_contiguity",
            MaskKind::Cloud => "cloud",
            MaskKind::CloudShadow => "cloud_shadow",
            MaskKind::SeaWater => "sea_water",
            MaskKind::TerrainShadow => "terrain_shadow",
            MaskKind::HighSlope => "high_slope",
            MaskKind::NoData => "no_data",
        }
    }
}

impl std::fmt::Display for MaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How the ACCA and Fmask detectors are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudAgreement {
    /// Either detector is enough
    #[default]
    Either,
    /// Both detectors must agree
    Both,
}

/// Cells where any contributing band lacks contiguous valid data
pub fn non_contiguity_mask(pq: &PixelQuality) -> MaskRaster {
    pq.make_mask(&[(PqFlag::Contiguous, false)])
}

fn detector_mask(
    pq: &PixelQuality,
    acca: PqFlag,
    fmask: PqFlag,
    agreement: CloudAgreement,
) -> MaskRaster {
    let contiguous = PqFlag::Contiguous;
    pq.data().mapv(|word| {
        let detected = match agreement {
            CloudAgreement::Either => acca.holds(word) || fmask.holds(word),
            CloudAgreement::Both => acca.holds(word) && fmask.holds(word),
        };
        // only contiguous cells carry trustworthy detector bits
        detected && contiguous.holds(word)
    })
}

/// Contiguous cells flagged as cloud
pub fn cloud_mask(pq: &PixelQuality, agreement: CloudAgreement) -> MaskRaster {
    detector_mask(pq, PqFlag::CloudAcca, PqFlag::CloudFmask, agreement)
}

/// Contiguous cells flagged as cloud shadow
pub fn cloud_shadow_mask(pq: &PixelQuality, agreement: CloudAgreement) -> MaskRaster {
    detector_mask(pq, PqFlag::CloudShadowAcca, PqFlag::CloudShadowFmask, agreement)
}

/// Cells outside the land mask
pub fn sea_water_mask(pq: &PixelQuality) -> MaskRaster {
    pq.make_mask(&[(PqFlag::LandSea, false)])
}

/// OR across bands of "value equals this band's own sentinel".
///
/// A sentinel that cannot be represented in `T` never matches.
pub fn no_data_mask_from<T>(bands: &[(&str, ArrayView2<'_, T>, f64)]) -> WofsResult<MaskRaster>
where
    T: Copy + PartialEq + NumCast + Send + Sync,
{
    let reference = match bands.first() {
        Some((_, view, _)) => view.dim(),
        None => return Ok(MaskRaster::default((0, 0))),
    };

    let mut mask = MaskRaster::from_elem(reference, false);
    for (name, view, sentinel) in bands {
        ensure_shape(&format!("no-data band {}", name), reference, view.dim())?;

        let sentinel: T = match <T as NumCast>::from(*sentinel) {
            Some(value) => value,
            None => {
                log::warn!("Sentinel {} of band {} is not representable, skipping", sentinel, name);
                continue;
            }
        };

        #[cfg(feature = "parallel")]
        Zip::from(&mut mask).and(view).par_for_each(|m, &v| {
            if v == sentinel {
                *m = true;
            }
        });
        #[cfg(not(feature = "parallel"))]
        Zip::from(&mut mask).and(view).for_each(|m, &v| {
            if v == sentinel {
                *m = true;
            }
        });
    }
    Ok(mask)
}

/// No-data mask over every band of a reflectance tile
pub fn no_data_mask(reflectance: &Reflectance) -> WofsResult<MaskRaster> {
    let bands = reflectance
        .bands()
        .iter()
        .map(|band| Ok((band.band.name(), band.data.view(), band.sentinel()?)))
        .collect::<WofsResult<Vec<_>>>()?;
    no_data_mask_from(&bands)
}

/// Producer of one boolean mask for a tile
pub trait MaskProvider: Send + Sync {
    fn kind(&self) -> MaskKind;

    fn compute(&self, inputs: &TileInputs) -> WofsResult<MaskRaster>;

    fn name(&self) -> &str {
        self.kind().name()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NonContiguityProvider;

impl MaskProvider for NonContiguityProvider {
    fn kind(&self) -> MaskKind {
        MaskKind::NonContiguity
    }

    fn compute(&self, inputs: &TileInputs) -> WofsResult<MaskRaster> {
        ensure_shape("pixel quality", inputs.dim(), inputs.pixel_quality.dim())?;
        Ok(non_contiguity_mask(&inputs.pixel_quality))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CloudProvider {
    pub agreement: CloudAgreement,
}

impl MaskProvider for CloudProvider {
    fn kind(&self) -> MaskKind {
        MaskKind::Cloud
    }

    fn compute(&self, inputs: &TileInputs) -> WofsResult<MaskRaster> {
        ensure_shape("pixel quality", inputs.dim(), inputs.pixel_quality.dim())?;
        Ok(cloud_mask(&inputs.pixel_quality, self.agreement))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CloudShadowProvider {
    pub agreement: CloudAgreement,
}

impl MaskProvider for CloudShadowProvider {
    fn kind(&self) -> MaskKind {
        MaskKind::CloudShadow
    }

    fn compute(&self, inputs: &TileInputs) -> WofsResult<MaskRaster> {
        ensure_shape("pixel quality", inputs.dim(), inputs.pixel_quality.dim())?;
        Ok(cloud_shadow_mask(&inputs.pixel_quality, self.agreement))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeaWaterProvider;

impl MaskProvider for SeaWaterProvider {
    fn kind(&self) -> MaskKind {
        MaskKind::SeaWater
    }

    fn compute(&self, inputs: &TileInputs) -> WofsResult<MaskRaster> {
        ensure_shape("pixel quality", inputs.dim(), inputs.pixel_quality.dim())?;
        Ok(sea_water_mask(&inputs.pixel_quality))
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoDataProvider;

impl MaskProvider for NoDataProvider {
    fn kind(&self) -> MaskKind {
        MaskKind::NoData
    }

    fn compute(&self, inputs: &TileInputs) -> WofsResult<MaskRaster> {
        ensure_shape("reflectance", inputs.dim(), inputs.reflectance.dim())?;
        no_data_mask(&inputs.reflectance)
    }
}

/// Mask computed elsewhere, e.g. a terrain-shadow raster derived from a DSM
#[derive(Debug, Clone)]
pub struct PrecomputedMask {
    kind: MaskKind,
    mask: MaskRaster,
}

impl PrecomputedMask {
    pub fn new(kind: MaskKind, mask: MaskRaster) -> Self {
        Self { kind, mask }
    }
}

impl MaskProvider for PrecomputedMask {
    fn kind(&self) -> MaskKind {
        self.kind
    }

    fn compute(&self, inputs: &TileInputs) -> WofsResult<MaskRaster> {
        ensure_shape(self.kind.name(), inputs.dim(), self.mask.dim())?;
        Ok(self.mask.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pixel_quality::PQ_CLEAR_LAND;
    use crate::core::reflectance::{ReflectanceBand, SpectralBand};
    use crate::types::WofsError;
    use ndarray::{array, Array2};

    fn word(flags: &[(PqFlag, bool)]) -> u16 {
        flags
            .iter()
            .fold(PQ_CLEAR_LAND, |w, &(flag, present)| flag.encode(w, present))
    }

    #[test]
    fn test_non_contiguity() {
        let gap = word(&[(PqFlag::Contiguous, false)]);
        let pq = PixelQuality::new(array![[gap, PQ_CLEAR_LAND]]);
        assert_eq!(non_contiguity_mask(&pq), array![[true, false]]);
    }

    #[test]
    fn test_cloud_either_detector() {
        let acca = word(&[(PqFlag::CloudAcca, true)]);
        let fmask = word(&[(PqFlag::CloudFmask, true)]);
        let both = word(&[(PqFlag::CloudAcca, true), (PqFlag::CloudFmask, true)]);
        let pq = PixelQuality::new(array![[acca, fmask, both, PQ_CLEAR_LAND]]);

        assert_eq!(
            cloud_mask(&pq, CloudAgreement::Either),
            array![[true, true, true, false]]
        );
        assert_eq!(
            cloud_mask(&pq, CloudAgreement::Both),
            array![[false, false, true, false]]
        );
    }

    #[test]
    fn test_cloud_requires_contiguity() {
        let cloudy_gap = word(&[(PqFlag::CloudAcca, true), (PqFlag::Contiguous, false)]);
        let shadow_gap = word(&[(PqFlag::CloudShadowFmask, true), (PqFlag::Contiguous, false)]);
        let pq = PixelQuality::new(array![[cloudy_gap, shadow_gap]]);

        assert_eq!(cloud_mask(&pq, CloudAgreement::Either), array![[false, false]]);
        assert_eq!(cloud_shadow_mask(&pq, CloudAgreement::Either), array![[false, false]]);
    }

    #[test]
    fn test_cloud_shadow_ignores_cloud_bits() {
        let cloudy = word(&[(PqFlag::CloudFmask, true)]);
        let shadow = word(&[(PqFlag::CloudShadowAcca, true)]);
        let pq = PixelQuality::new(array![[cloudy, shadow]]);
        assert_eq!(cloud_shadow_mask(&pq, CloudAgreement::Either), array![[false, true]]);
    }

    #[test]
    fn test_sea_water() {
        let sea = word(&[(PqFlag::LandSea, false)]);
        let pq = PixelQuality::new(array![[sea, PQ_CLEAR_LAND]]);
        assert_eq!(sea_water_mask(&pq), array![[true, false]]);
    }

    #[test]
    fn test_no_data_per_band_sentinels() {
        let a: Array2<i16> = array![[-999, 5], [-1, 7]];
        let b: Array2<i16> = array![[3, -1], [4, -999]];
        let mask = no_data_mask_from(&[("a", a.view(), -999.0), ("b", b.view(), -1.0)]).unwrap();
        // -1 in band a and -999 in band b are ordinary values there
        assert_eq!(mask, array![[true, true], [false, false]]);
    }

    #[test]
    fn test_no_data_unrepresentable_sentinel() {
        let a: Array2<u8> = array![[0, 255]];
        let mask = no_data_mask_from(&[("a", a.view(), -999.0)]).unwrap();
        assert_eq!(mask, array![[false, false]]);
    }

    #[test]
    fn test_no_data_shape_mismatch() {
        let a: Array2<i16> = Array2::zeros((2, 2));
        let b: Array2<i16> = Array2::zeros((2, 3));
        let result = no_data_mask_from(&[("a", a.view(), -999.0), ("b", b.view(), -999.0)]);
        assert!(matches!(result, Err(WofsError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_no_data_missing_sentinel() {
        let tile = Reflectance::new(vec![
            ReflectanceBand::new(SpectralBand::Blue, Array2::zeros((2, 2)), Some(-999.0)),
            ReflectanceBand::new(SpectralBand::Green, Array2::zeros((2, 2)), None),
        ])
        .unwrap();
        match no_data_mask(&tile) {
            Err(WofsError::MissingSentinel { band }) => assert_eq!(band, "green"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_mask_kind_codes() {
        assert_eq!(MaskKind::NoData.flag(), WaterFlag::NoData);
        assert_eq!(MaskKind::CloudShadow.flag().value(), 32);
        assert_eq!(MaskKind::TerrainShadow.flag().value(), 8);
    }
}
