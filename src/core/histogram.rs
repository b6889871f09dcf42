//! Per-code pixel histogram and conservation check

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::flags::WaterFlag;
use crate::types::{FlagRaster, WofsError, WofsResult};

/// Pixel counts of a fused flag raster, one entry per vocabulary code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelHistogram {
    /// Indexed by [`WaterFlag::index`]
    counts: [usize; 9],
    total_pixels: usize,
}

impl PixelHistogram {
    pub fn from_raster(flags: &FlagRaster) -> Self {
        let mut bins = [0usize; 256];
        for &value in flags.iter() {
            bins[value as usize] += 1;
        }

        let mut counts = [0usize; 9];
        for flag in WaterFlag::ALL {
            counts[flag.index()] = bins[flag.value() as usize];
        }

        Self {
            counts,
            total_pixels: flags.len(),
        }
    }

    pub fn count(&self, flag: WaterFlag) -> usize {
        self.counts[flag.index()]
    }

    /// Sum over the defined codes
    pub fn counted(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn total_pixels(&self) -> usize {
        self.total_pixels
    }

    pub fn unrecognized(&self) -> usize {
        self.total_pixels.saturating_sub(self.counted())
    }

    pub fn percentage(&self, flag: WaterFlag) -> f64 {
        if self.total_pixels == 0 {
            0.0
        } else {
            100.0 * self.count(flag) as f64 / self.total_pixels as f64
        }
    }

    /// Clear observations: wet or dry, not masked
    pub fn clear_pixels(&self) -> usize {
        self.count(WaterFlag::WaterPresent) + self.count(WaterFlag::WaterNotPresent)
    }

    pub fn iter(&self) -> impl Iterator<Item = (WaterFlag, usize)> + '_ {
        WaterFlag::ALL
            .iter()
            .map(move |&flag| (flag, self.counts[flag.index()]))
    }

    /// Counts keyed by code name, for metadata documents
    pub fn to_map(&self) -> BTreeMap<String, usize> {
        self.iter()
            .map(|(flag, count)| (flag.name().to_string(), count))
            .collect()
    }

    /// Hard failure unless every pixel carries a vocabulary code
    pub fn validate(&self) -> WofsResult<()> {
        let counted = self.counted();
        if counted != self.total_pixels {
            log::error!(
                "Flag raster holds {} pixels with unrecognised codes",
                self.unrecognized()
            );
            return Err(WofsError::Consistency {
                counted,
                expected: self.total_pixels,
                unrecognized: self.unrecognized(),
            });
        }
        Ok(())
    }

    pub fn report(&self) {
        log::info!("Flag histogram ({} pixels):", self.total_pixels);
        for (flag, count) in self.iter() {
            if count > 0 {
                log::info!("   {:<22} {:>10} ({:.2}%)", flag.name(), count, self.percentage(flag));
            }
        }
    }
}

/// Count, log and validate a fused raster
pub fn validate_flags(flags: &FlagRaster) -> WofsResult<PixelHistogram> {
    let histogram = PixelHistogram::from_raster(flags);
    histogram.report();
    histogram.validate()?;
    Ok(histogram)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_counts_sum_to_total() {
        let flags: FlagRaster = array![[0, 128, 1], [2, 64, 32], [128, 128, 0]];
        let histogram = validate_flags(&flags).unwrap();

        assert_eq!(histogram.count(WaterFlag::WaterPresent), 3);
        assert_eq!(histogram.count(WaterFlag::WaterNotPresent), 2);
        assert_eq!(histogram.count(WaterFlag::MaskedCloud), 1);
        assert_eq!(histogram.count(WaterFlag::MaskedSeaWater), 0);
        assert_eq!(histogram.counted(), 9);
        assert_eq!(histogram.clear_pixels(), 5);
        assert_relative_eq!(histogram.percentage(WaterFlag::WaterPresent), 100.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_unrecognised_code_fails() {
        let flags: FlagRaster = array![[0, 3], [128, 130]];
        match validate_flags(&flags) {
            Err(WofsError::Consistency { counted, expected, unrecognized }) => {
                assert_eq!(counted, 2);
                assert_eq!(expected, 4);
                assert_eq!(unrecognized, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_empty_raster() {
        let flags: FlagRaster = Array2::zeros((0, 0));
        let histogram = validate_flags(&flags).unwrap();
        assert_eq!(histogram.total_pixels(), 0);
        assert_eq!(histogram.percentage(WaterFlag::NoData), 0.0);
    }

    #[test]
    fn test_map_names() {
        let flags: FlagRaster = array![[1, 1]];
        let map = PixelHistogram::from_raster(&flags).to_map();
        assert_eq!(map["NO_DATA"], 2);
        assert_eq!(map.len(), 9);
    }

    #[test]
    fn test_every_mask_combination_is_conserved() {
        use crate::core::fusion::{FusionEngine, FusionStep, PrecedenceChain};
        use crate::core::masks::CloudAgreement;

        let chain = PrecedenceChain::standard(CloudAgreement::Either);
        let flags: Vec<WaterFlag> = chain.steps().iter().map(|step| step.flag).collect();
        let side = 1usize << (flags.len() / 2);
        let subsets = side * side;
        assert_eq!(subsets, 1 << flags.len());

        // cell i holds mask k where bit k of i is set
        let masks: Vec<Array2<bool>> = (0..flags.len())
            .map(|k| Array2::from_shape_fn((side, side), |(r, c)| (r * side + c) >> k & 1 == 1))
            .collect();
        let steps: Vec<FusionStep<'_>> = masks
            .iter()
            .zip(&flags)
            .map(|(mask, flag)| FusionStep::new(flag.name(), mask, *flag))
            .collect();

        let raws: [FlagRaster; 3] = [
            Array2::zeros((side, side)),
            Array2::from_elem((side, side), 128),
            Array2::from_shape_fn((side, side), |(r, c)| if (r + c) % 2 == 0 { 128 } else { 0 }),
        ];
        for raw in &raws {
            let fused = FusionEngine::fuse(raw, &steps).unwrap();
            for ((r, c), &code) in fused.indexed_iter() {
                let subset = r * side + c;
                let expected = (0..flags.len())
                    .rev()
                    .find(|k| subset >> k & 1 == 1)
                    .map(|k| flags[k].value())
                    .unwrap_or(raw[[r, c]]);
                assert_eq!(code, expected, "mask subset {:04b}", subset);
            }

            let histogram = validate_flags(&fused).unwrap();
            assert_eq!(histogram.counted(), histogram.total_pixels());
            assert_eq!(histogram.total_pixels(), subsets);
            // no-data is last in the chain, so it owns every subset containing it
            assert_eq!(histogram.count(WaterFlag::NoData), subsets / 2);
        }
    }
}
