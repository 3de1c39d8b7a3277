//! Per-pipeline run status.
//!
//! The scheduler records the outcome of every pass here so the last result,
//! run count and error count of each pipeline can be inspected and logged.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use etl_pipeline::PassReport;

/// Result of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassResult {
    Success,
    /// Pass failed with an error message
    Failed(String),
}

/// Status of a registered pipeline.
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    pub pipeline: String,
    /// When the last pass finished (if ever)
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<PassResult>,
    /// Documents loaded by the last successful pass
    pub last_loaded: usize,
    pub run_count: u64,
    pub error_count: u64,
}

impl PipelineStatus {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            last_loaded: 0,
            run_count: 0,
            error_count: 0,
        }
    }
}

/// Status of every registered pipeline, keyed by name.
#[derive(Debug, Default)]
pub struct StatusRegistry {
    pipelines: BTreeMap<String, PipelineStatus>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline. An existing entry is replaced.
    pub fn register(&mut self, pipeline: &str) {
        self.pipelines
            .insert(pipeline.to_string(), PipelineStatus::new(pipeline));
    }

    /// Record a finished pass.
    pub fn record_complete(
        &mut self,
        pipeline: &str,
        result: PassResult,
        duration_ms: u64,
        report: Option<&PassReport>,
    ) {
        if let Some(status) = self.pipelines.get_mut(pipeline) {
            status.last_run = Some(Utc::now());
            status.last_duration_ms = Some(duration_ms);
            status.run_count += 1;
            if matches!(result, PassResult::Failed(_)) {
                status.error_count += 1;
            }
            if let Some(report) = report {
                status.last_loaded = report.loaded;
            }
            status.last_result = Some(result);
        }
    }

    pub fn get_status(&self, pipeline: &str) -> Option<&PipelineStatus> {
        self.pipelines.get(pipeline)
    }

    /// Every status, ordered by pipeline name.
    pub fn get_all_status(&self) -> Vec<&PipelineStatus> {
        self.pipelines.values().collect()
    }

    pub fn is_registered(&self, pipeline: &str) -> bool {
        self.pipelines.contains_key(pipeline)
    }
}
