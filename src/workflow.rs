//! Batch processing of tile tasks
//!
//! A task names the reflectance and pixel-quality files of one observation
//! of one cell. Tasks run in parallel and fail independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Platform, TimeRange, WofsConfig};
use crate::core::pipeline::{TileInputs, WaterTilePipeline};
use crate::core::provenance::{find_valid_region, DatasetRecord, Lineage, SourceDatasets};
use crate::io::emitter::RasterEmitter;
use crate::io::naming::OutputNaming;
use crate::io::tile_reader::TileReader;
use crate::types::{BoundingBox, CellIndex, WofsError, WofsResult};

/// One observation of one cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileTask {
    pub platform: Platform,
    pub cell: CellIndex,
    pub time: DateTime<Utc>,
    pub reflectance_path: PathBuf,
    pub pixel_quality_path: PathBuf,
    #[serde(default)]
    pub sources: SourceDatasets,
    /// Extent of the cell; defaults to the reflectance footprint
    #[serde(default)]
    pub extent: Option<BoundingBox>,
}

/// Read a JSON array of tasks
pub fn load_tasks<P: AsRef<Path>>(path: P) -> WofsResult<Vec<TileTask>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let tasks: Vec<TileTask> = serde_json::from_str(&text)
        .map_err(|e| WofsError::InvalidFormat(format!("Invalid task manifest: {}", e)))?;
    log::info!("Loaded {} tasks from {}", tasks.len(), path.as_ref().display());
    Ok(tasks)
}

/// Keep the tasks acquired within `range`
pub fn filter_tasks(tasks: Vec<TileTask>, range: Option<&TimeRange>) -> Vec<TileTask> {
    match range {
        Some(range) => tasks.into_iter().filter(|t| range.contains(&t.time)).collect(),
        None => tasks,
    }
}

/// Output paths that are already present, for dry runs
pub fn check_existing_outputs(tasks: &[TileTask], naming: &OutputNaming) -> Vec<PathBuf> {
    tasks
        .iter()
        .map(|task| naming.path(task.platform, task.cell, &task.time))
        .filter(|path| path.exists())
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Written(PathBuf),
    /// Inputs do not overlap inside the cell
    Skipped,
}

/// Per-task results of a batch
#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<(PathBuf, WofsResult<TaskOutcome>)>,
}

impl BatchReport {
    pub fn successful(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, Ok(TaskOutcome::Written(_))))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, Ok(TaskOutcome::Skipped)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_err()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &WofsError)> {
        self.results
            .iter()
            .filter_map(|(path, r)| r.as_ref().err().map(|e| (path, e)))
    }
}

/// Loads, fuses and emits tiles
pub struct TileProcessor {
    config: WofsConfig,
    pipeline: WaterTilePipeline,
    naming: OutputNaming,
    emitter: Arc<dyn RasterEmitter>,
}

impl TileProcessor {
    pub fn new(config: WofsConfig, pipeline: WaterTilePipeline, emitter: Arc<dyn RasterEmitter>) -> Self {
        let naming = OutputNaming::from_config(&config);
        Self { config, pipeline, naming, emitter }
    }

    pub fn naming(&self) -> &OutputNaming {
        &self.naming
    }

    /// Process one task into its standard output path
    pub fn process_task(&self, task: &TileTask) -> WofsResult<TaskOutcome> {
        let output = self.naming.path(task.platform, task.cell, &task.time);
        self.process_task_to(task, &output)
    }

    /// Process one task into an explicit output path
    pub fn process_task_to(&self, task: &TileTask, output: &Path) -> WofsResult<TaskOutcome> {
        let output = output.to_path_buf();
        log::info!("Processing cell {} at {} -> {}", task.cell, task.time, output.display());

        if output.exists() {
            return Err(WofsError::OutputExists(output));
        }

        let (reflectance, geometry) = TileReader::read_reflectance(&task.reflectance_path)?;
        let (pixel_quality, pq_geometry) = TileReader::read_pixel_quality(&task.pixel_quality_path)?;

        let (rows, cols) = reflectance.dim();
        let footprint = geometry.geo_transform.extent(rows, cols);
        let pq_dim = pixel_quality.dim();
        let pq_footprint = pq_geometry.geo_transform.extent(pq_dim.0, pq_dim.1);
        let extent = task.extent.unwrap_or(footprint);

        let valid = match find_valid_region(&extent, &[footprint, pq_footprint]) {
            Some(region) => region,
            None => {
                log::warn!("Inputs for cell {} do not overlap, skipping", task.cell);
                return Ok(TaskOutcome::Skipped);
            }
        };

        let inputs = TileInputs::new(reflectance, pixel_quality);
        let fused = self.pipeline.run(&inputs)?;

        let lineage = Lineage::from_config(
            &self.config,
            self.pipeline.classifier_name(),
            &self.pipeline.chain().kinds(),
        );
        let record = DatasetRecord::new(task.platform, task.cell, task.time, task.sources.clone())
            .with_geometry(geometry.epsg, extent, Some(valid))
            .with_lineage(lineage)
            .with_histogram(&fused.histogram)
            .with_global_attributes(&self.config)
            .with_uri(&output);

        let written = self.emitter.emit(&fused.flags, &geometry, &record, &output)?;
        Ok(TaskOutcome::Written(written))
    }

    /// Run every task; one failure never aborts the others
    pub fn process_tasks(&self, tasks: &[TileTask]) -> BatchReport {
        log::info!("Processing {} tasks", tasks.len());

        let run = |task: &TileTask| {
            let output = self.naming.path(task.platform, task.cell, &task.time);
            let result = self.process_task(task);
            if let Err(e) = &result {
                log::error!("Task for {} failed: {}", output.display(), e);
            }
            (output, result)
        };

        #[cfg(feature = "parallel")]
        let results = {
            use rayon::prelude::*;
            tasks.par_iter().map(run).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let results = tasks.iter().map(run).collect();

        let report = BatchReport { results };
        log::info!(
            "{} successful, {} skipped, {} failed",
            report.successful(),
            report.skipped(),
            report.failed()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn task(year: i32, x: i32) -> TileTask {
        TileTask {
            platform: Platform::Landsat7,
            cell: CellIndex::new(x, -40),
            time: Utc.with_ymd_and_hms(year, 6, 1, 0, 0, 0).unwrap(),
            reflectance_path: PathBuf::from("nbar.tif"),
            pixel_quality_path: PathBuf::from("pq.tif"),
            sources: SourceDatasets::default(),
            extent: None,
        }
    }

    #[test]
    fn test_filter_by_year() {
        let tasks = vec![task(1995, 1), task(1998, 2), task(2003, 3)];
        let range = TimeRange::parse("1996-2001").unwrap();
        let kept = filter_tasks(tasks.clone(), Some(&range));
        assert_eq!(kept, vec![task(1998, 2)]);
        assert_eq!(filter_tasks(tasks, None).len(), 3);
    }

    #[test]
    fn test_manifest_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(
            &path,
            r#"[{"platform": "LANDSAT-7", "cell": {"x": 1, "y": -40},
                 "time": "1998-06-01T00:00:00Z",
                 "reflectance_path": "nbar.tif", "pixel_quality_path": "pq.tif"}]"#,
        )
        .unwrap();
        assert_eq!(load_tasks(&path).unwrap(), vec![task(1998, 1)]);

        std::fs::write(&path, "{}").unwrap();
        assert!(matches!(load_tasks(&path), Err(WofsError::InvalidFormat(_))));
    }

    #[test]
    fn test_existing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let naming = OutputNaming::new(dir.path(), "tif");
        let tasks = vec![task(1998, 1), task(1999, 2)];

        let existing = naming.path(tasks[1].platform, tasks[1].cell, &tasks[1].time);
        std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
        std::fs::write(&existing, b"").unwrap();

        assert_eq!(check_existing_outputs(&tasks, &naming), vec![existing]);
    }
}
