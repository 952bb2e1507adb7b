use std::fs;
use std::path::{Path, PathBuf};

use crate::api::ratio_dto::{OverviewRecordDto, RatioRecordDto};
use crate::domain::analysis::scheduler::BucketResult;
use crate::error::Result;

/// `tracing` target of the per-bucket analytics records.
pub const ANALYTICS_TARGET: &str = "analytics";

pub const OVERVIEW_FILE: &str = "overview.csv";
pub const RATIOS_FILE: &str = "ratios.csv";

/// Writes run results as `;`-separated CSV tables.
///
/// Only buckets that completed are written. A bucket whose solver model was infeasible still
/// contributes its heuristic rows, if any.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// One `timestamp;model;min_util;max_util;avg_util` row per bucket and calculation.
    pub fn write_overview(&self, results: &[BucketResult]) -> Result<PathBuf> {
        let path = self.prepare(OVERVIEW_FILE)?;
        let mut writer = csv::WriterBuilder::new().delimiter(b';').from_path(&path)?;
        let mut rows = 0;

        for report in results.iter().filter_map(|r| r.report()) {
            for result in report.results() {
                let Some(summary) = &result.summary else {
                    continue;
                };

                writer.serialize(OverviewRecordDto {
                    timestamp: report.timestamp.clone(),
                    model: result.model.clone(),
                    min_util: summary.min_util,
                    max_util: summary.max_util,
                    avg_util: summary.avg_util,
                })?;
                rows += 1;
            }
        }

        writer.flush()?;
        log::info!("Wrote {} overview rows to '{}'.", rows, path.display());
        Ok(path)
    }

    /// One `timestamp;flow;path;ratio` row per routed (flow, path). The file can be fed back as
    /// external ratios.
    pub fn write_ratios(&self, results: &[BucketResult]) -> Result<PathBuf> {
        let path = self.prepare(RATIOS_FILE)?;
        let mut writer = csv::WriterBuilder::new().delimiter(b';').from_path(&path)?;
        let mut rows = 0;

        for report in results.iter().filter_map(|r| r.report()) {
            // The optimized table wins when both calculations ran.
            let Some(result) = report.results().last() else {
                continue;
            };

            for (flow, route, ratio) in result.ratios.iter() {
                writer.serialize(RatioRecordDto { timestamp: report.timestamp.clone(), flow: flow.to_string(), path: route.to_string(), ratio })?;
                rows += 1;
            }
        }

        writer.flush()?;
        log::info!("Wrote {} ratio rows to '{}'.", rows, path.display());
        Ok(path)
    }

    fn prepare(&self, file: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        Ok(self.output_dir.join(file))
    }
}
