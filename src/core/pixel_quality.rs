//! Legacy pixel-quality (PQ25) bitfield decoding

use ndarray::Zip;
use serde::{Deserialize, Serialize};

use crate::types::{MaskRaster, PqImage};

/// Named flags of the legacy pixel-quality product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PqFlag {
    BlueSaturated,
    GreenSaturated,
    RedSaturated,
    NirSaturated,
    Swir1Saturated,
    Tir1Saturated,
    Tir2Saturated,
    Swir2Saturated,
    Contiguous,
    LandSea,
    CloudAcca,
    CloudFmask,
    CloudShadowAcca,
    CloudShadowFmask,
}

impl PqFlag {
    pub const ALL: [PqFlag; 14] = [
        PqFlag::BlueSaturated,
        PqFlag::GreenSaturated,
        PqFlag::RedSaturated,
        PqFlag::NirSaturated,
        PqFlag::Swir1Saturated,
        PqFlag::Tir1Saturated,
        PqFlag::Tir2Saturated,
        PqFlag::Swir2Saturated,
        PqFlag::Contiguous,
        PqFlag::LandSea,
        PqFlag::CloudAcca,
        PqFlag::CloudFmask,
        PqFlag::CloudShadowAcca,
        PqFlag::CloudShadowFmask,
    ];

    pub fn bit(self) -> u16 {
        match self {
            PqFlag::BlueSaturated => 0,
            PqFlag::GreenSaturated => 1,
            PqFlag::RedSaturated => 2,
            PqFlag::NirSaturated => 3,
            PqFlag::Swir1Saturated => 4,
            PqFlag::Tir1Saturated => 5,
            PqFlag::Tir2Saturated => 6,
            PqFlag::Swir2Saturated => 7,
            PqFlag::Contiguous => 8,
            PqFlag::LandSea => 9,
            PqFlag::CloudAcca => 10,
            PqFlag::CloudFmask => 11,
            PqFlag::CloudShadowAcca => 12,
            PqFlag::CloudShadowFmask => 13,
        }
    }

    /// Whether the named condition holds when the bit is *set*.
    ///
    /// Saturation, cloud and cloud-shadow bits are cleared when the
    /// condition is present; `contiguous` and `land_sea` (land) are set.
    pub fn set_means_present(self) -> bool {
        matches!(self, PqFlag::Contiguous | PqFlag::LandSea)
    }

    pub fn name(self) -> &'static str {
        match self {
            PqFlag::BlueSaturated => "blue_saturated",
            PqFlag::GreenSaturated => "green_saturated",
            PqFlag::RedSaturated => "red_saturated",
            PqFlag::NirSaturated => "nir_saturated",
            PqFlag::Swir1Saturated => "swir1_saturated",
            PqFlag::Tir1Saturated => "tir1_saturated",
            PqFlag::Tir2Saturated => "tir2_saturated",
            PqFlag::Swir2Saturated => "swir2_saturated",
            PqFlag::Contiguous => "contiguous",
            PqFlag::LandSea => "land",
            PqFlag::CloudAcca => "cloud_acca",
            PqFlag::CloudFmask => "cloud_fmask",
            PqFlag::CloudShadowAcca => "cloud_shadow_acca",
            PqFlag::CloudShadowFmask => "cloud_shadow_fmask",
        }
    }

    pub fn from_name(name: &str) -> Option<PqFlag> {
        Self::ALL.iter().copied().find(|flag| flag.name() == name)
    }

    /// Decode one PQ word
    pub fn holds(self, word: u16) -> bool {
        let set = word & (1 << self.bit()) != 0;
        set == self.set_means_present()
    }

    /// Encode the flag into `word`
    pub fn encode(self, word: u16, present: bool) -> u16 {
        let mask = 1u16 << self.bit();
        if present == self.set_means_present() {
            word | mask
        } else {
            word & !mask
        }
    }
}

/// Bits of a clear, contiguous land pixel (no saturation, cloud or shadow)
pub const PQ_CLEAR_LAND: u16 = 0b0011_1111_1111_1111;

/// Pixel-quality raster with named-flag decoding
#[derive(Debug, Clone)]
pub struct PixelQuality {
    data: PqImage,
}

impl PixelQuality {
    pub fn new(data: PqImage) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &PqImage {
        &self.data
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Boolean raster of a single flag
    pub fn flag(&self, flag: PqFlag) -> MaskRaster {
        self.data.mapv(|word| flag.holds(word))
    }

    /// Cells where every `(flag, expected)` condition matches
    pub fn make_mask(&self, conditions: &[(PqFlag, bool)]) -> MaskRaster {
        log::debug!(
            "Building PQ mask from {:?}",
            conditions
                .iter()
                .map(|(flag, expected)| format!("{}={}", flag.name(), expected))
                .collect::<Vec<_>>()
        );

        let mut mask = MaskRaster::from_elem(self.data.dim(), true);
        Zip::from(&mut mask).and(&self.data).for_each(|m, &word| {
            *m = conditions
                .iter()
                .all(|&(flag, expected)| flag.holds(word) == expected);
        });
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_clear_land_word() {
        for flag in PqFlag::ALL {
            let expected = matches!(flag, PqFlag::Contiguous | PqFlag::LandSea);
            assert_eq!(flag.holds(PQ_CLEAR_LAND), expected, "{}", flag.name());
        }
    }

    #[test]
    fn test_encode_round_trip() {
        let word = PqFlag::CloudFmask.encode(PQ_CLEAR_LAND, true);
        assert!(PqFlag::CloudFmask.holds(word));
        assert!(!PqFlag::CloudAcca.holds(word));
        let word = PqFlag::Contiguous.encode(word, false);
        assert!(!PqFlag::Contiguous.holds(word));
        assert_eq!(word & (1 << 8), 0);
    }

    #[test]
    fn test_make_mask_ands_conditions() {
        let cloudy = PqFlag::CloudAcca.encode(PQ_CLEAR_LAND, true);
        let cloudy_gap = PqFlag::Contiguous.encode(cloudy, false);
        let pq = PixelQuality::new(array![[PQ_CLEAR_LAND, cloudy], [cloudy_gap, PQ_CLEAR_LAND]]);

        let mask = pq.make_mask(&[(PqFlag::CloudAcca, true), (PqFlag::Contiguous, true)]);
        assert_eq!(mask, array![[false, true], [false, false]]);

        let all = pq.make_mask(&[]);
        assert!(all.iter().all(|&m| m));
    }

    #[test]
    fn test_flag_names() {
        assert_eq!(PqFlag::from_name("cloud_shadow_fmask"), Some(PqFlag::CloudShadowFmask));
        assert_eq!(PqFlag::from_name("nonsense"), None);
    }
}
