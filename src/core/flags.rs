//! Water observation flag vocabulary
//!
//! Every cell of a fused flag raster holds exactly one of these codes. The
//! codes are individually powers of two, but the fusion policy is
//! last-write-wins so they are never OR-combined in an output raster.

use serde::{Deserialize, Serialize};

/// Closed set of output codes.
///
/// Neither numeric order nor [`WaterFlag::ALL`] says which code wins a
/// cell. The override order lives in the fusion chain, see
/// [`PrecedenceChain::standard`](crate::core::fusion::PrecedenceChain::standard).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaterFlag {
    WaterNotPresent = 0,
    WaterPresent = 128,
    NoData = 1,
    MaskedNoContiguity = 2,
    MaskedSeaWater = 4,
    MaskedTerrainShadow = 8,
    MaskedHighSlope = 16,
    MaskedCloudShadow = 32,
    MaskedCloud = 64,
}

impl WaterFlag {
    /// Every code once, classifications first; the histogram bin order
    pub const ALL: [WaterFlag; 9] = [
        WaterFlag::WaterNotPresent,
        WaterFlag::WaterPresent,
        WaterFlag::NoData,
        WaterFlag::MaskedNoContiguity,
        WaterFlag::MaskedSeaWater,
        WaterFlag::MaskedTerrainShadow,
        WaterFlag::MaskedHighSlope,
        WaterFlag::MaskedCloudShadow,
        WaterFlag::MaskedCloud,
    ];

    /// Numeric code written to the raster
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Position in [`WaterFlag::ALL`]
    pub fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|&flag| flag == self)
            .unwrap_or(0)
    }

    pub fn from_value(value: u8) -> Option<WaterFlag> {
        Self::ALL.iter().copied().find(|flag| flag.value() == value)
    }

    pub fn is_valid_code(value: u8) -> bool {
        Self::from_value(value).is_some()
    }

    /// True for the two codes a raw classifier may emit
    pub fn is_classification(self) -> bool {
        matches!(self, WaterFlag::WaterNotPresent | WaterFlag::WaterPresent)
    }

    pub fn name(self) -> &'static str {
        match self {
            WaterFlag::WaterNotPresent => "WATER_NOT_PRESENT",
            WaterFlag::WaterPresent => "WATER_PRESENT",
            WaterFlag::NoData => "NO_DATA",
            WaterFlag::MaskedNoContiguity => "MASKED_NO_CONTIGUITY",
            WaterFlag::MaskedSeaWater => "MASKED_SEA_WATER",
            WaterFlag::MaskedTerrainShadow => "MASKED_TERRAIN_SHADOW",
            WaterFlag::MaskedHighSlope => "MASKED_HIGH_SLOPE",
            WaterFlag::MaskedCloudShadow => "MASKED_CLOUD_SHADOW",
            WaterFlag::MaskedCloud => "MASKED_CLOUD",
        }
    }
}

impl std::fmt::Display for WaterFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.value())
    }
}

impl From<WaterFlag> for u8 {
    fn from(flag: WaterFlag) -> u8 {
        flag.value()
    }
}

impl TryFrom<u8> for WaterFlag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        WaterFlag::from_value(value).ok_or(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_vocabulary() {
        assert_eq!(WaterFlag::WaterNotPresent.value(), 0);
        assert_eq!(WaterFlag::WaterPresent.value(), 128);
        assert_eq!(WaterFlag::NoData.value(), 1);
        assert_eq!(WaterFlag::MaskedNoContiguity.value(), 2);
        assert_eq!(WaterFlag::MaskedSeaWater.value(), 4);
        assert_eq!(WaterFlag::MaskedTerrainShadow.value(), 8);
        assert_eq!(WaterFlag::MaskedHighSlope.value(), 16);
        assert_eq!(WaterFlag::MaskedCloudShadow.value(), 32);
        assert_eq!(WaterFlag::MaskedCloud.value(), 64);
    }

    #[test]
    fn test_codes_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for flag in WaterFlag::ALL {
            assert!(seen.insert(flag.value()), "duplicate code {}", flag);
        }
        assert_eq!(seen.len(), 9);
    }

    #[test]
    fn test_from_value() {
        assert_eq!(WaterFlag::from_value(64), Some(WaterFlag::MaskedCloud));
        assert_eq!(WaterFlag::try_from(1u8), Ok(WaterFlag::NoData));
        assert_eq!(WaterFlag::from_value(3), None);
        assert_eq!(WaterFlag::try_from(130u8), Err(130));
        assert!(!WaterFlag::is_valid_code(255));
    }

    #[test]
    fn test_index_matches_listing() {
        for (position, flag) in WaterFlag::ALL.iter().enumerate() {
            assert_eq!(flag.index(), position);
        }
        assert_eq!(WaterFlag::WaterNotPresent.index(), 0);
        assert_eq!(WaterFlag::NoData.index(), 2);
        assert!(WaterFlag::WaterPresent.is_classification());
        assert!(!WaterFlag::NoData.is_classification());
    }
}
