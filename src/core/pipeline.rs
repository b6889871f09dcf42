//! Per-tile water observation pipeline
//!
//! classify ─┐
//!           ├─> fuse (chain order) ─> validate histogram
//! masks ────┘

use std::sync::Arc;

use crate::config::WofsConfig;
use crate::core::classifier::{check_classification, WaterClassifier};
use crate::core::fusion::{FusionEngine, FusionStep, FusionSummary, PrecedenceChain};
use crate::core::histogram::{validate_flags, PixelHistogram};
use crate::core::masks::{MaskKind, SeaWaterProvider};
use crate::core::pixel_quality::PixelQuality;
use crate::core::reflectance::Reflectance;
use crate::types::{FlagRaster, MaskRaster, WofsResult};

/// Everything loaded for one observation of one cell
#[derive(Debug, Clone)]
pub struct TileInputs {
    pub reflectance: Reflectance,
    pub pixel_quality: PixelQuality,
}

impl TileInputs {
    pub fn new(reflectance: Reflectance, pixel_quality: PixelQuality) -> Self {
        Self { reflectance, pixel_quality }
    }

    /// Reference shape every raster of the tile must match
    pub fn dim(&self) -> (usize, usize) {
        self.reflectance.dim()
    }
}

/// Frozen result of fusing one tile
#[derive(Debug, Clone)]
pub struct FusedTile {
    pub flags: FlagRaster,
    pub histogram: PixelHistogram,
    pub summary: FusionSummary,
}

/// Classifier plus precedence chain
#[derive(Clone)]
pub struct WaterTilePipeline {
    classifier: Arc<dyn WaterClassifier>,
    chain: PrecedenceChain,
}

impl WaterTilePipeline {
    pub fn new(classifier: Arc<dyn WaterClassifier>, chain: PrecedenceChain) -> Self {
        Self { classifier, chain }
    }

    /// Standard chain, with the optional sea-water step just before no-data
    pub fn from_config(
        config: &WofsConfig,
        classifier: Arc<dyn WaterClassifier>,
    ) -> WofsResult<Self> {
        let mut chain = PrecedenceChain::standard(config.cloud_agreement);
        if config.mask_sea_water {
            chain.insert_before(MaskKind::NoData, Arc::new(SeaWaterProvider))?;
        }
        Ok(Self::new(classifier, chain))
    }

    pub fn chain(&self) -> &PrecedenceChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut PrecedenceChain {
        &mut self.chain
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    /// Masks of every chain step, in chain order
    #[cfg(feature = "parallel")]
    pub fn compute_masks(&self, inputs: &TileInputs) -> WofsResult<Vec<MaskRaster>> {
        use rayon::prelude::*;

        self.chain
            .steps()
            .par_iter()
            .map(|step| step.provider.compute(inputs))
            .collect()
    }

    /// Masks of every chain step, in chain order
    #[cfg(not(feature = "parallel"))]
    pub fn compute_masks(&self, inputs: &TileInputs) -> WofsResult<Vec<MaskRaster>> {
        self.chain
            .steps()
            .iter()
            .map(|step| step.provider.compute(inputs))
            .collect()
    }

    pub fn run(&self, inputs: &TileInputs) -> WofsResult<FusedTile> {
        let dim = inputs.dim();
        log::info!(
            "Producing water tile {}x{} with {} classifier and {} masks",
            dim.0,
            dim.1,
            self.classifier.name(),
            self.chain.len()
        );

        #[cfg(feature = "parallel")]
        let (raw, masks) = rayon::join(
            || self.classifier.classify(&inputs.reflectance),
            || self.compute_masks(inputs),
        );
        #[cfg(not(feature = "parallel"))]
        let (raw, masks) = (
            self.classifier.classify(&inputs.reflectance),
            self.compute_masks(inputs),
        );

        let mut flags = raw?;
        check_classification(&flags, dim)?;
        let masks = masks?;

        let steps: Vec<FusionStep<'_>> = self
            .chain
            .steps()
            .iter()
            .zip(&masks)
            .map(|(step, mask)| FusionStep::new(step.provider.name(), mask, step.flag))
            .collect();
        let summary = FusionEngine::fuse_in_place(&mut flags, &steps)?;

        let histogram = validate_flags(&flags)?;
        Ok(FusedTile { flags, histogram, summary })
    }
}
