//! Job：一次顶层运行及其所有委派子运行的汇总记录

use serde::{Deserialize, Serialize};

use crate::model::{CheckpointStatus, Usage};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Running,
    Completed,
    StoppedByInteractiveTool,
    StoppedByExceededMaxSteps,
    StoppedByError,
}

impl From<CheckpointStatus> for JobStatus {
    fn from(status: CheckpointStatus) -> Self {
        match status {
            CheckpointStatus::Completed => Self::Completed,
            CheckpointStatus::StoppedByInteractiveTool => Self::StoppedByInteractiveTool,
            CheckpointStatus::StoppedByExceededMaxSteps => Self::StoppedByExceededMaxSteps,
            CheckpointStatus::StoppedByError => Self::StoppedByError,
            CheckpointStatus::Init
            | CheckpointStatus::Proceeding
            | CheckpointStatus::StoppedByDelegate => Self::Running,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub coordinator_expert_key: String,
    pub total_steps: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,
    pub usage: Usage,
    pub started_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
}

impl Job {
    pub fn new(id: impl Into<String>, coordinator_expert_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Running,
            coordinator_expert_key: coordinator_expert_key.into(),
            total_steps: 0,
            max_steps: None,
            usage: Usage::default(),
            started_at: chrono::Utc::now().timestamp_millis(),
            finished_at: None,
        }
    }
}
