// ABOUTME: Pipeline run record: trigger, per-stage status, bundle, artifact, and deployment.
// ABOUTME: Stages move pending → running → succeeded/failed; a failed stage halts the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::PipelineErrorKind;
use crate::deploy::DeploymentState;
use crate::substrate::SourceBundle;
use crate::types::{ArtifactRef, DeploymentId, PipelineRunId, TriggerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Source,
    Build,
    Deploy,
}

impl StageName {
    pub const ALL: [StageName; 3] = [StageName::Source, StageName::Build, StageName::Deploy];
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageName::Source => "source",
            StageName::Build => "build",
            StageName::Deploy => "deploy",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: StageName,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Why a run halted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub stage: StageName,
    pub kind: PipelineErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: PipelineRunId,
    pub trigger: TriggerEvent,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<SourceBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_state: Option<DeploymentState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

impl PipelineRun {
    pub fn new(trigger: TriggerEvent) -> Self {
        Self {
            id: PipelineRunId::generate("run"),
            trigger,
            started_at: Utc::now(),
            finished_at: None,
            stages: StageName::ALL
                .into_iter()
                .map(|name| StageRecord {
                    name,
                    status: StageStatus::Pending,
                    started_at: None,
                    finished_at: None,
                })
                .collect(),
            bundle: None,
            artifact: None,
            build_log: None,
            deployment: None,
            deployment_state: None,
            failure: None,
        }
    }

    pub fn stage(&self, name: StageName) -> &StageRecord {
        // Every run carries all three stages.
        &self.stages[name as usize]
    }

    fn stage_mut(&mut self, name: StageName) -> &mut StageRecord {
        &mut self.stages[name as usize]
    }

    pub(crate) fn start(&mut self, name: StageName) {
        let stage = self.stage_mut(name);
        stage.status = StageStatus::Running;
        stage.started_at = Some(Utc::now());
    }

    pub(crate) fn succeed(&mut self, name: StageName) {
        let now = Utc::now();
        let stage = self.stage_mut(name);
        stage.status = StageStatus::Succeeded;
        stage.finished_at = Some(now);
        if name == StageName::Deploy {
            self.finished_at = Some(now);
        }
    }

    pub(crate) fn fail(&mut self, name: StageName, kind: PipelineErrorKind, message: String) {
        let now = Utc::now();
        let stage = self.stage_mut(name);
        stage.status = StageStatus::Failed;
        stage.finished_at = Some(now);
        self.finished_at = Some(now);
        self.failure = Some(RunFailure {
            stage: name,
            kind,
            message,
        });
    }

    pub fn succeeded(&self) -> bool {
        self.stages.iter().all(|s| s.status == StageStatus::Succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RevisionId;

    fn run() -> PipelineRun {
        PipelineRun::new(TriggerEvent::new(
            RevisionId::new("0123456789abcdef").unwrap(),
            "main",
        ))
    }

    #[test]
    fn new_run_has_pending_stages_in_order() {
        let r = run();
        let names: Vec<_> = r.stages.iter().map(|s| s.name).collect();
        assert_eq!(names, StageName::ALL);
        assert!(r.stages.iter().all(|s| s.status == StageStatus::Pending));
        assert!(!r.succeeded());
    }

    #[test]
    fn failing_a_stage_finishes_the_run() {
        let mut r = run();
        r.start(StageName::Source);
        r.succeed(StageName::Source);
        r.start(StageName::Build);
        r.fail(StageName::Build, PipelineErrorKind::BuildFailed, "exit 1".into());
        assert_eq!(r.stage(StageName::Build).status, StageStatus::Failed);
        assert_eq!(r.stage(StageName::Deploy).status, StageStatus::Pending);
        assert!(r.finished_at.is_some());
        assert_eq!(r.failure.as_ref().unwrap().stage, StageName::Build);
    }
}
