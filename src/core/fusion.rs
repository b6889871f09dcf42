//! Flag fusion engine
//!
//! Applies quality masks to a raw water classification in a fixed order. A
//! later step overwrites whatever an earlier one wrote, so the position of a
//! step in the [`PrecedenceChain`] is its precedence.

use ndarray::Zip;
use std::sync::Arc;

use crate::core::flags::WaterFlag;
use crate::core::masks::{
    CloudAgreement, CloudProvider, CloudShadowProvider, MaskKind, MaskProvider, NoDataProvider,
    NonContiguityProvider,
};
use crate::types::{ensure_shape, FlagRaster, MaskRaster, WofsError, WofsResult};

/// One override: where `mask` holds, write `flag`
#[derive(Debug, Clone, Copy)]
pub struct FusionStep<'a> {
    pub label: &'a str,
    pub mask: &'a MaskRaster,
    pub flag: WaterFlag,
}

impl<'a> FusionStep<'a> {
    pub fn new(label: &'a str, mask: &'a MaskRaster, flag: WaterFlag) -> Self {
        Self { label, mask, flag }
    }
}

/// Cells claimed by each step, in application order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionSummary {
    pub steps: Vec<(String, WaterFlag, usize)>,
}

impl FusionSummary {
    pub fn claimed(&self, label: &str) -> Option<usize> {
        self.steps
            .iter()
            .find(|(name, _, _)| name == label)
            .map(|(_, _, count)| *count)
    }
}

/// Sequential mask application over a single owned flag raster
pub struct FusionEngine;

impl FusionEngine {
    /// Fuse into a new raster, leaving `raw` untouched
    pub fn fuse(raw: &FlagRaster, steps: &[FusionStep<'_>]) -> WofsResult<FlagRaster> {
        let mut flags = raw.clone();
        Self::fuse_in_place(&mut flags, steps)?;
        Ok(flags)
    }

    /// Fuse in place.
    ///
    /// Every mask is shape-checked before the first write, so an error
    /// leaves `flags` unchanged.
    pub fn fuse_in_place(
        flags: &mut FlagRaster,
        steps: &[FusionStep<'_>],
    ) -> WofsResult<FusionSummary> {
        let dim = flags.dim();
        for step in steps {
            ensure_shape(&format!("{} mask", step.label), dim, step.mask.dim())?;
        }

        log::debug!("Fusing {} masks into {}x{} flag raster", steps.len(), dim.0, dim.1);

        let mut summary = FusionSummary::default();
        for step in steps {
            let claimed = Self::apply_step(flags, step.mask, step.flag.value());
            log::debug!("  {} -> {}: {} cells", step.label, step.flag, claimed);
            summary.steps.push((step.label.to_string(), step.flag, claimed));
        }

        Ok(summary)
    }

    #[cfg(feature = "parallel")]
    fn apply_step(flags: &mut FlagRaster, mask: &MaskRaster, value: u8) -> usize {
        use rayon::prelude::*;

        Zip::from(flags).and(mask).par_for_each(|cell, &hit| {
            if hit {
                *cell = value;
            }
        });
        mask.as_slice_memory_order()
            .map(|cells| cells.par_iter().filter(|&&hit| hit).count())
            .unwrap_or_else(|| mask.iter().filter(|&&hit| hit).count())
    }

    #[cfg(not(feature = "parallel"))]
    fn apply_step(flags: &mut FlagRaster, mask: &MaskRaster, value: u8) -> usize {
        let mut claimed = 0;
        Zip::from(flags).and(mask).for_each(|cell, &hit| {
            if hit {
                *cell = value;
                claimed += 1;
            }
        });
        claimed
    }
}

/// One entry of the precedence chain
#[derive(Clone)]
pub struct PrecedenceStep {
    pub provider: Arc<dyn MaskProvider>,
    pub flag: WaterFlag,
}

impl std::fmt::Debug for PrecedenceStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrecedenceStep")
            .field("provider", &self.provider.name())
            .field("flag", &self.flag)
            .finish()
    }
}

/// Ordered (mask provider, target code) pairs, weakest first
#[derive(Debug, Clone, Default)]
pub struct PrecedenceChain {
    steps: Vec<PrecedenceStep>,
}

impl PrecedenceChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-contiguity, cloud, cloud shadow, then no-data last
    pub fn standard(agreement: CloudAgreement) -> Self {
        let mut chain = Self::new();
        chain.push(Arc::new(NonContiguityProvider));
        chain.push(Arc::new(CloudProvider { agreement }));
        chain.push(Arc::new(CloudShadowProvider { agreement }));
        chain.push(Arc::new(NoDataProvider));
        chain
    }

    /// Append with the provider's own code
    pub fn push(&mut self, provider: Arc<dyn MaskProvider>) {
        let flag = provider.kind().flag();
        self.push_with_flag(provider, flag);
    }

    pub fn push_with_flag(&mut self, provider: Arc<dyn MaskProvider>, flag: WaterFlag) {
        self.steps.push(PrecedenceStep { provider, flag });
    }

    /// Insert immediately before the first step of kind `anchor`
    pub fn insert_before(
        &mut self,
        anchor: MaskKind,
        provider: Arc<dyn MaskProvider>,
    ) -> WofsResult<()> {
        let index = self.position(anchor)?;
        let flag = provider.kind().flag();
        self.steps.insert(index, PrecedenceStep { provider, flag });
        Ok(())
    }

    /// Insert immediately after the first step of kind `anchor`
    pub fn insert_after(
        &mut self,
        anchor: MaskKind,
        provider: Arc<dyn MaskProvider>,
    ) -> WofsResult<()> {
        let index = self.position(anchor)?;
        let flag = provider.kind().flag();
        self.steps.insert(index + 1, PrecedenceStep { provider, flag });
        Ok(())
    }

    fn position(&self, anchor: MaskKind) -> WofsResult<usize> {
        self.steps
            .iter()
            .position(|step| step.provider.kind() == anchor)
            .ok_or_else(|| {
                WofsError::Config(format!("No {} step in precedence chain", anchor))
            })
    }

    pub fn steps(&self) -> &[PrecedenceStep] {
        &self.steps
    }

    pub fn kinds(&self) -> Vec<MaskKind> {
        self.steps.iter().map(|step| step.provider.kind()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
