/*!
 * Dataset provenance record for emitted water tiles
 *
 * Each output carries:
 * - ids of the reflectance, pixel-quality and terrain datasets it was derived from
 * - the tile extent and the region where every input had data
 * - the no-data code and unit convention of the flag band
 * - algorithm lineage and the flag histogram
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

use crate::config::{Platform, WofsConfig, APP_NAME};
use crate::core::flags::WaterFlag;
use crate::core::histogram::PixelHistogram;
use crate::core::masks::MaskKind;
use crate::types::{BoundingBox, CellIndex, WofsError, WofsResult};

/// Name of the product the records belong to
pub const PRODUCT_NAME: &str = "wofs_albers";

/// Region of the tile where every input is available.
///
/// `None` when the inputs do not overlap inside the tile; such tiles are
/// not worth processing.
pub fn find_valid_region(tile: &BoundingBox, sources: &[BoundingBox]) -> Option<BoundingBox> {
    sources
        .iter()
        .try_fold(*tile, |region, source| region.intersection(source))
}

/// Ids of the datasets a tile was derived from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDatasets {
    pub reflectance: Vec<String>,
    pub pixel_quality: Vec<String>,
    pub terrain: Vec<String>,
}

impl SourceDatasets {
    pub fn all(&self) -> Vec<&str> {
        self.reflectance
            .iter()
            .chain(&self.pixel_quality)
            .chain(&self.terrain)
            .map(String::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.reflectance.is_empty() && self.pixel_quality.is_empty() && self.terrain.is_empty()
    }

    /// Name-based UUID over `product` and the sorted source ids
    pub fn derive_id(&self, product: &str) -> Uuid {
        let mut ids = self.all();
        ids.sort_unstable();
        let key = format!("{},{}", product, ids.join(","));
        Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes())
    }
}

/// Algorithm identity and parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lineage {
    pub algorithm: String,
    pub version: String,
    pub repo_url: String,
    pub parameters: BTreeMap<String, String>,
}

impl Lineage {
    pub fn from_config(config: &WofsConfig, classifier: &str, chain: &[MaskKind]) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert(
            "configuration_file".to_string(),
            config
                .config_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        );
        parameters.insert("classifier".to_string(), classifier.to_string());
        parameters.insert(
            "cloud_agreement".to_string(),
            format!("{:?}", config.cloud_agreement).to_lowercase(),
        );
        parameters.insert(
            "mask_order".to_string(),
            chain.iter().map(|k| k.name()).collect::<Vec<_>>().join(","),
        );

        Self {
            algorithm: format!("datacube-{}", APP_NAME),
            version: config.algorithm_version.clone(),
            repo_url: config.repo_url.clone(),
            parameters,
        }
    }
}

/// Indexable description of one emitted water tile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    pub product: String,
    pub platform: String,
    pub instrument: String,
    pub cell: CellIndex,
    pub center_time: DateTime<Utc>,
    pub creation_time: DateTime<Utc>,
    pub uri: Option<String>,
    pub crs: String,
    pub extent: Option<BoundingBox>,
    pub valid_data: Option<BoundingBox>,
    /// Code written where the scene has no data
    pub nodata: u8,
    /// Unit-less convention tag
    pub units: String,
    pub sources: SourceDatasets,
    pub lineage: Option<Lineage>,
    pub histogram: BTreeMap<String, usize>,
    pub global_attributes: BTreeMap<String, String>,
}

impl DatasetRecord {
    /// The id is derived from `sources`, or from the observation itself when
    /// no source ids are known
    pub fn new(
        platform: Platform,
        cell: CellIndex,
        center_time: DateTime<Utc>,
        sources: SourceDatasets,
    ) -> Self {
        let id = if sources.is_empty() {
            log::warn!("No source dataset ids for cell {}, deriving id from the observation", cell);
            let observation = format!("{}/{}/{}", platform, cell, center_time.to_rfc3339());
            Uuid::new_v5(&Uuid::NAMESPACE_URL, observation.as_bytes())
        } else {
            sources.derive_id(PRODUCT_NAME)
        };

        Self {
            id: id.to_string(),
            product: PRODUCT_NAME.to_string(),
            platform: platform.platform_name().to_string(),
            instrument: platform.sensor_name().to_string(),
            cell,
            center_time,
            creation_time: Utc::now(),
            uri: None,
            crs: "EPSG:3577".to_string(),
            extent: None,
            valid_data: None,
            nodata: WaterFlag::NoData.value(),
            units: "1".to_string(),
            sources,
            lineage: None,
            histogram: BTreeMap::new(),
            global_attributes: BTreeMap::new(),
        }
    }

    pub fn with_geometry(mut self, epsg: u32, extent: BoundingBox, valid_data: Option<BoundingBox>) -> Self {
        self.crs = format!("EPSG:{}", epsg);
        self.extent = Some(extent);
        self.valid_data = valid_data;
        self
    }

    pub fn with_lineage(mut self, lineage: Lineage) -> Self {
        self.lineage = Some(lineage);
        self
    }

    pub fn with_histogram(mut self, histogram: &PixelHistogram) -> Self {
        self.histogram = histogram.to_map();
        self
    }

    /// Global attributes of the configuration plus platform and instrument
    pub fn with_global_attributes(mut self, config: &WofsConfig) -> Self {
        self.global_attributes = config.global_attributes.clone();
        self.global_attributes.insert("platform".to_string(), self.platform.clone());
        self.global_attributes.insert("instrument".to_string(), self.instrument.clone());
        self
    }

    pub fn with_uri(mut self, path: &Path) -> Self {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };
        self.uri = Some(format!("file://{}", absolute.display()));
        self
    }

    pub fn export_json(&self) -> WofsResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| WofsError::Processing(format!("Metadata serialization failed: {}", e)))
    }

    pub fn export_xml(&self) -> WofsResult<String> {
        quick_xml::se::to_string_with_root("dataset", self)
            .map_err(|e| WofsError::Processing(format!("Metadata serialization failed: {}", e)))
    }

    pub fn from_json(text: &str) -> WofsResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| WofsError::InvalidFormat(format!("Invalid dataset record: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, output_path: P, format: &str) -> WofsResult<()> {
        let content = match format.to_lowercase().as_str() {
            "json" => self.export_json()?,
            "xml" => self.export_xml()?,
            _ => {
                return Err(WofsError::Processing(format!(
                    "Unsupported metadata format: {}",
                    format
                )))
            }
        };

        std::fs::write(output_path.as_ref(), content)?;
        log::info!("Metadata saved to: {}", output_path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ndarray::array;

    fn sources(reflectance: &[&str], pixel_quality: &[&str]) -> SourceDatasets {
        SourceDatasets {
            reflectance: reflectance.iter().map(|s| s.to_string()).collect(),
            pixel_quality: pixel_quality.iter().map(|s| s.to_string()).collect(),
            terrain: vec![],
        }
    }

    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1990, 3, 2, 23, 11, 5).unwrap()
    }

    fn record() -> DatasetRecord {
        let histogram = PixelHistogram::from_raster(&array![[0, 128], [1, 64]]);
        DatasetRecord::new(Platform::Landsat5, CellIndex::new(15, -40), time(), sources(&["nbar-1"], &["pq-1"]))
            .with_geometry(3577, BoundingBox::new(0.0, 0.0, 100.0, 100.0), Some(BoundingBox::new(10.0, 0.0, 100.0, 90.0)))
            .with_histogram(&histogram)
            .with_global_attributes(&WofsConfig::default())
            .with_lineage(Lineage::from_config(&WofsConfig::default(), "mndwi", &[MaskKind::NonContiguity, MaskKind::NoData]))
    }

    #[test]
    fn test_valid_region() {
        let tile = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let nbar = BoundingBox::new(-50.0, 10.0, 80.0, 200.0);
        let pq = BoundingBox::new(5.0, -10.0, 120.0, 95.0);
        assert_eq!(
            find_valid_region(&tile, &[nbar, pq]),
            Some(BoundingBox::new(5.0, 10.0, 80.0, 95.0))
        );
        assert_eq!(find_valid_region(&tile, &[]), Some(tile));

        let elsewhere = BoundingBox::new(500.0, 500.0, 600.0, 600.0);
        assert_eq!(find_valid_region(&tile, &[nbar, elsewhere]), None);
    }

    #[test]
    fn test_record_defaults() {
        let record = record();
        assert_eq!(record.nodata, 1);
        assert_eq!(record.units, "1");
        assert_eq!(record.instrument, "TM");
        assert_eq!(record.global_attributes["platform"], "LANDSAT-5");
        assert_eq!(record.histogram["MASKED_CLOUD"], 1);
        assert_eq!(record.sources.all(), vec!["nbar-1", "pq-1"]);
        let lineage = record.lineage.as_ref().unwrap();
        assert_eq!(lineage.algorithm, "datacube-wofs");
        assert_eq!(lineage.parameters["mask_order"], "non_contiguity,no_data");
    }

    #[test]
    fn test_id_follows_sources() {
        let cell = CellIndex::new(15, -40);
        let a = DatasetRecord::new(Platform::Landsat5, cell, time(), sources(&["nbar-1"], &["pq-1"]));
        let again = DatasetRecord::new(Platform::Landsat5, cell, time(), sources(&["nbar-1"], &["pq-1"]));
        let other = DatasetRecord::new(Platform::Landsat5, cell, time(), sources(&["nbar-2"], &["pq-1"]));

        assert_eq!(a.id, again.id);
        assert_ne!(a.id, other.id);
        assert!(Uuid::parse_str(&a.id).is_ok());

        // source order does not matter
        let swapped = sources(&["pq-1"], &["nbar-1"]);
        assert_eq!(swapped.derive_id(PRODUCT_NAME).to_string(), a.id);
    }

    #[test]
    fn test_id_without_sources() {
        let cell = CellIndex::new(15, -40);
        let a = DatasetRecord::new(Platform::Landsat5, cell, time(), SourceDatasets::default());
        let again = DatasetRecord::new(Platform::Landsat5, cell, time(), SourceDatasets::default());
        let elsewhere = DatasetRecord::new(Platform::Landsat5, CellIndex::new(16, -40), time(), SourceDatasets::default());
        assert_eq!(a.id, again.id);
        assert_ne!(a.id, elsewhere.id);
    }

    #[test]
    fn test_json_export_round_trip() {
        let record = record();
        let json = record.export_json().unwrap();
        assert!(json.contains("\"nodata\": 1"));
        assert_eq!(DatasetRecord::from_json(&json).unwrap(), record);
    }

    #[test]
    fn test_xml_export() {
        let xml = record().export_xml().unwrap();
        assert!(xml.starts_with("<dataset>"));
        assert!(xml.contains("<nodata>1</nodata>"));
        assert!(xml.contains("<reflectance>nbar-1</reflectance>"));
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let result = record().save_to_file(dir.path().join("x.yaml"), "yaml");
        assert!(matches!(result, Err(WofsError::Processing(_))));
    }
}
