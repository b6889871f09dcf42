//! Core water observation modules

pub mod flags;
pub mod pixel_quality;
pub mod reflectance;
pub mod masks;
pub mod fusion;
pub mod histogram;
pub mod classifier;
pub mod pipeline;
pub mod provenance;

// Re-export main types
pub use flags::WaterFlag;
pub use pixel_quality::{PixelQuality, PqFlag, PQ_CLEAR_LAND};
pub use reflectance::{Reflectance, ReflectanceBand, SpectralBand};
pub use masks::{
    CloudAgreement, MaskKind, MaskProvider, PrecomputedMask, cloud_mask, cloud_shadow_mask,
    no_data_mask, no_data_mask_from, non_contiguity_mask, sea_water_mask,
};
pub use fusion::{FusionEngine, FusionStep, FusionSummary, PrecedenceChain, PrecedenceStep};
pub use histogram::{PixelHistogram, validate_flags};
pub use classifier::{MndwiClassifier, MndwiParams, WaterClassifier};
pub use pipeline::{FusedTile, TileInputs, WaterTilePipeline};
pub use provenance::{DatasetRecord, Lineage, SourceDatasets, find_valid_region};
