//! Per-stage outcomes and the run record the orchestrator mutates.

use super::{RunStatus, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Input of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunInput {
    /// The domain the run is about.
    pub domain: String,
    /// Stable identifier of the result record.
    pub slug: String,
}

impl RunInput {
    /// Creates a new run input.
    #[must_use]
    pub fn new(domain: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            slug: slug.into(),
        }
    }
}

/// The record of one stage within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Stage name.
    pub stage_name: String,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Everything the model produced, in arrival order.
    #[serde(default)]
    pub raw_text: String,
    /// The final parsed result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_result: Option<Value>,
    /// Stage status.
    pub status: StageStatus,
}

impl StageOutcome {
    /// Creates a running outcome starting now.
    #[must_use]
    pub fn running(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            raw_text: String::new(),
            parsed_result: None,
            status: StageStatus::Running,
        }
    }

    /// Marks the outcome complete with its parsed result.
    pub fn complete(&mut self, parsed: Value, duration_ms: u64) {
        self.completed_at = Some(Utc::now());
        self.duration_ms = Some(duration_ms);
        self.parsed_result = Some(parsed);
        self.status = StageStatus::Complete;
    }

    /// Marks the outcome failed.
    pub fn fail(&mut self, duration_ms: u64) {
        self.completed_at = Some(Utc::now());
        self.duration_ms = Some(duration_ms);
        self.status = StageStatus::Failed;
    }
}

/// One end-to-end execution of the stage sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// The run id.
    pub run_id: Uuid,
    /// The run input.
    pub input: RunInput,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Outcomes of the stages started so far, in order.
    pub stages: Vec<StageOutcome>,
    /// Run status.
    pub status: RunStatus,
    /// The assembled result, once all stages completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Whether the result reached the persistence collaborator.
    #[serde(default)]
    pub persisted: bool,
}

impl PipelineRun {
    /// Creates a new running run.
    #[must_use]
    pub fn new(run_id: Uuid, input: RunInput) -> Self {
        Self {
            run_id,
            input,
            started_at: Utc::now(),
            stages: Vec::new(),
            status: RunStatus::Running,
            result: None,
            persisted: false,
        }
    }

    /// Returns the outcome of a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.stage_name == name)
    }

    /// Returns the names of completed stages in order.
    #[must_use]
    pub fn completed_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Complete)
            .map(|s| s.stage_name.as_str())
            .collect()
    }

    /// Moves the run to a new status unless it already failed.
    pub fn transition(&mut self, status: RunStatus) {
        if self.status != RunStatus::Failed {
            self.status = status;
        }
    }
}
