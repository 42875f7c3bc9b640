//! Primary render state of a streamed run.
//!
//! Only rare events (`start`, `agent_start`, `agent_complete`, `complete`,
//! `error`) touch this state. Partial fields live in the
//! [`FieldStore`](super::FieldStore).

use crate::core::{StageStatus, StreamEvent};
use crate::utils::parse_timestamp;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Lifecycle of a client subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    /// Waiting for the first event.
    #[default]
    Connecting,
    /// Events are arriving.
    Streaming,
    /// The run completed.
    Complete,
    /// The run or the connection failed.
    Failed,
    /// The user cancelled.
    Cancelled,
}

impl ClientStatus {
    /// Returns true if the subscription is over.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

/// Render state of one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageView {
    /// Stage name.
    pub name: String,
    /// Stage status.
    pub status: StageStatus,
    /// Status message from `agent_start`.
    pub message: String,
    /// Duration from `agent_complete`.
    pub duration_ms: Option<u64>,
    /// Summary from `agent_complete`.
    pub summary: Option<String>,
    /// Final output from `agent_complete`.
    pub output: Option<Value>,
}

impl StageView {
    fn running(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StageStatus::Running,
            message: message.to_string(),
            duration_ms: None,
            summary: None,
            output: None,
        }
    }
}

/// Render state of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunView {
    /// Subscription status.
    pub status: ClientStatus,
    /// Run id from `start`.
    pub pipeline_id: Option<String>,
    /// Start time from `start`.
    pub started_at: Option<DateTime<Utc>>,
    /// Last reported progress.
    pub progress: u8,
    /// Last status message.
    pub message: String,
    /// Stages in start order.
    pub stages: Vec<StageView>,
    /// Final result from `complete`.
    pub campaign: Option<Value>,
    /// Terminal error message.
    pub error: Option<String>,
    /// Recoverable problems reported during the run.
    pub warnings: Vec<String>,
}

impl RunView {
    /// Returns a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageView> {
        self.stages.iter().find(|s| s.name == name)
    }

    fn stage_mut(&mut self, name: &str) -> Option<&mut StageView> {
        self.stages.iter_mut().find(|s| s.name == name)
    }

    fn stage_index(&mut self, name: &str) -> usize {
        if let Some(index) = self.stages.iter().position(|s| s.name == name) {
            return index;
        }
        self.stages.push(StageView::running(name, ""));
        self.stages.len() - 1
    }

    /// Applies an event. Returns false for events this state ignores.
    pub fn apply(&mut self, event: &StreamEvent) -> bool {
        match event {
            StreamEvent::Start(p) => {
                self.status = ClientStatus::Streaming;
                self.pipeline_id = Some(p.pipeline_id.clone());
                self.started_at = parse_timestamp(&p.started_at).ok();
            }
            StreamEvent::AgentStart(p) => {
                self.status = ClientStatus::Streaming;
                self.progress = self.progress.max(p.progress);
                self.message.clone_from(&p.message);
                let index = self.stage_index(&p.agent);
                self.stages[index] = StageView::running(&p.agent, &p.message);
            }
            StreamEvent::AgentToken(_) => return false,
            StreamEvent::AgentComplete(p) => {
                self.progress = self.progress.max(p.progress);
                let index = self.stage_index(&p.agent);
                let stage = &mut self.stages[index];
                stage.status = StageStatus::Complete;
                stage.duration_ms = Some(p.duration);
                stage.summary = Some(p.result.clone());
                stage.output = Some(p.output.clone());
            }
            StreamEvent::Complete(p) => {
                self.status = ClientStatus::Complete;
                self.progress = p.progress;
                self.message.clone_from(&p.message);
                self.campaign = Some(p.campaign.clone());
            }
            StreamEvent::Error(p) if p.recoverable => {
                self.warnings.push(p.message.clone());
            }
            StreamEvent::Error(p) => {
                self.status = ClientStatus::Failed;
                self.error = Some(p.message.clone());
                if let Some(stage) = p.agent.as_deref().and_then(|a| self.stage_mut(a)) {
                    stage.status = StageStatus::Failed;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AgentCompletePayload, CompletePayload, StartPayload};
    use serde_json::json;

    fn complete(agent: &str, progress: u8) -> StreamEvent {
        StreamEvent::AgentComplete(AgentCompletePayload {
            agent: agent.to_string(),
            duration: 120,
            result: "3 fields".to_string(),
            output: json!({"companyName": "Acme"}),
            progress,
        })
    }

    #[test]
    fn test_stage_lifecycle() {
        let mut view = RunView::default();
        view.apply(&StreamEvent::Start(StartPayload {
            pipeline_id: "run-1".to_string(),
            domain: "acme.com".to_string(),
            slug: "acme".to_string(),
            started_at: "2024-01-01T00:00:00+00:00".to_string(),
        }));
        view.apply(&StreamEvent::agent_start("profile", "Reading the site", 5));
        assert_eq!(view.status, ClientStatus::Streaming);
        assert_eq!(view.stage("profile").unwrap().status, StageStatus::Running);

        view.apply(&complete("profile", 20));
        let stage = view.stage("profile").unwrap();
        assert_eq!(stage.status, StageStatus::Complete);
        assert_eq!(stage.duration_ms, Some(120));
        assert_eq!(view.progress, 20);
        assert_eq!(view.pipeline_id.as_deref(), Some("run-1"));
        assert!(view.started_at.is_some());
    }

    #[test]
    fn test_tokens_are_ignored() {
        let mut view = RunView::default();
        let token = StreamEvent::from_frame("agent_token", r#"{"agent":"profile","fields":{},"fieldCount":0,"tokenCount":1}"#)
            .unwrap()
            .unwrap();
        assert!(!view.apply(&token));
        assert_eq!(view, RunView::default());
    }

    #[test]
    fn test_warning_is_not_terminal() {
        let mut view = RunView::default();
        view.apply(&StreamEvent::warning("Failed to persist 'acme'"));
        view.apply(&StreamEvent::Complete(CompletePayload {
            slug: "acme".to_string(),
            campaign: json!({"emails": []}),
            progress: 100,
            message: "Campaign ready".to_string(),
        }));

        assert_eq!(view.status, ClientStatus::Complete);
        assert_eq!(view.warnings, vec!["Failed to persist 'acme'"]);
        assert!(view.error.is_none());
        assert_eq!(view.progress, 100);
    }

    #[test]
    fn test_terminal_error_marks_stage() {
        let mut view = RunView::default();
        view.apply(&StreamEvent::agent_start("rank", "Ranking", 30));
        view.apply(&StreamEvent::error("bad json", Some("rank".to_string())));

        assert_eq!(view.status, ClientStatus::Failed);
        assert_eq!(view.error.as_deref(), Some("bad json"));
        assert_eq!(view.stage("rank").unwrap().status, StageStatus::Failed);
        assert!(view.status.is_terminal());
    }

    #[test]
    fn test_restarted_stage_resets() {
        let mut view = RunView::default();
        view.apply(&StreamEvent::agent_start("profile", "Reading", 0));
        view.apply(&complete("profile", 20));
        view.apply(&StreamEvent::agent_start("profile", "Again", 20));

        let stage = view.stage("profile").unwrap();
        assert_eq!(stage.status, StageStatus::Running);
        assert!(stage.output.is_none());
        assert_eq!(view.stages.len(), 1);
    }
}
