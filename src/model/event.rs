//! 运行事件
//!
//! RunEvent：每次状态转换恰好产生一个，携带重建该转换所需的全部字段；不可变、可无损序列化，
//! 是持久化的审计 / 回放日志。
//! RuntimeEvent：流式增量与技能生命周期通知，仅用于实时展示，不持久化。

use serde::{Deserialize, Serialize};

use crate::llm::LlmError;
use crate::model::{Checkpoint, Message, Step, ToolCall, ToolResult, Usage};

/// 终止运行的错误载荷
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub is_retryable: bool,
}

impl RunFailure {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            status_code: None,
            is_retryable: false,
        }
    }
}

impl From<&LlmError> for RunFailure {
    fn from(err: &LlmError) -> Self {
        Self {
            name: err.name.clone(),
            message: err.message.clone(),
            status_code: err.status_code,
            is_retryable: err.is_retryable,
        }
    }
}

/// 状态转换种类（封闭集合，每种一个变体，无默认字段）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RunEventKind {
    StartRun {
        checkpoint: Checkpoint,
        step: Step,
        input_messages: Vec<Message>,
    },
    Retry {
        checkpoint: Checkpoint,
        step: Step,
        reason: String,
        new_messages: Vec<Message>,
        usage: Usage,
    },
    CallTools {
        checkpoint: Checkpoint,
        step: Step,
        new_message: Message,
        tool_calls: Vec<ToolCall>,
        usage: Usage,
    },
    CallDelegate {
        checkpoint: Checkpoint,
        step: Step,
        tool_calls: Vec<ToolCall>,
    },
    CallInteractiveTool {
        checkpoint: Checkpoint,
        step: Step,
        tool_call: ToolCall,
    },
    ResolveToolResults {
        checkpoint: Checkpoint,
        step: Step,
        tool_results: Vec<ToolResult>,
    },
    AttemptCompletion {
        checkpoint: Checkpoint,
        step: Step,
        tool_result: ToolResult,
    },
    ContinueToNextStep {
        checkpoint: Checkpoint,
        step: Step,
    },
    StopRunByInteractiveTool {
        checkpoint: Checkpoint,
        step: Step,
    },
    StopRunByDelegate {
        checkpoint: Checkpoint,
        step: Step,
    },
    StopRunByExceededMaxSteps {
        checkpoint: Checkpoint,
        step: Step,
    },
    StopRunByError {
        checkpoint: Checkpoint,
        step: Step,
        error: RunFailure,
    },
    CompleteRun {
        checkpoint: Checkpoint,
        step: Step,
        text: String,
        usage: Usage,
    },
}

impl RunEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartRun { .. } => "startRun",
            Self::Retry { .. } => "retry",
            Self::CallTools { .. } => "callTools",
            Self::CallDelegate { .. } => "callDelegate",
            Self::CallInteractiveTool { .. } => "callInteractiveTool",
            Self::ResolveToolResults { .. } => "resolveToolResults",
            Self::AttemptCompletion { .. } => "attemptCompletion",
            Self::ContinueToNextStep { .. } => "continueToNextStep",
            Self::StopRunByInteractiveTool { .. } => "stopRunByInteractiveTool",
            Self::StopRunByDelegate { .. } => "stopRunByDelegate",
            Self::StopRunByExceededMaxSteps { .. } => "stopRunByExceededMaxSteps",
            Self::StopRunByError { .. } => "stopRunByError",
            Self::CompleteRun { .. } => "completeRun",
        }
    }

    /// 转换后的 Checkpoint
    pub fn checkpoint(&self) -> &Checkpoint {
        match self {
            Self::StartRun { checkpoint, .. }
            | Self::Retry { checkpoint, .. }
            | Self::CallTools { checkpoint, .. }
            | Self::CallDelegate { checkpoint, .. }
            | Self::CallInteractiveTool { checkpoint, .. }
            | Self::ResolveToolResults { checkpoint, .. }
            | Self::AttemptCompletion { checkpoint, .. }
            | Self::ContinueToNextStep { checkpoint, .. }
            | Self::StopRunByInteractiveTool { checkpoint, .. }
            | Self::StopRunByDelegate { checkpoint, .. }
            | Self::StopRunByExceededMaxSteps { checkpoint, .. }
            | Self::StopRunByError { checkpoint, .. }
            | Self::CompleteRun { checkpoint, .. } => checkpoint,
        }
    }

    pub fn step(&self) -> &Step {
        match self {
            Self::StartRun { step, .. }
            | Self::Retry { step, .. }
            | Self::CallTools { step, .. }
            | Self::CallDelegate { step, .. }
            | Self::CallInteractiveTool { step, .. }
            | Self::ResolveToolResults { step, .. }
            | Self::AttemptCompletion { step, .. }
            | Self::ContinueToNextStep { step, .. }
            | Self::StopRunByInteractiveTool { step, .. }
            | Self::StopRunByDelegate { step, .. }
            | Self::StopRunByExceededMaxSteps { step, .. }
            | Self::StopRunByError { step, .. }
            | Self::CompleteRun { step, .. } => step,
        }
    }
}

/// 持久化的运行事件
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub id: String,
    pub job_id: String,
    pub run_id: String,
    pub expert_key: String,
    pub step_number: u64,
    pub timestamp: i64,
    #[serde(flatten)]
    pub kind: RunEventKind,
}

impl RunEvent {
    pub fn new(kind: RunEventKind) -> Self {
        let checkpoint = kind.checkpoint();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: checkpoint.job_id.clone(),
            run_id: checkpoint.run_id.clone(),
            expert_key: checkpoint.expert.key.clone(),
            step_number: checkpoint.step_number,
            timestamp: chrono::Utc::now().timestamp_millis(),
            kind,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

/// 实时通知种类
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RuntimeEventKind {
    StartReasoning,
    StreamReasoning { delta: String },
    CompleteReasoning { text: String },
    StartRunResult,
    StreamRunResult { delta: String },
    CompleteRunResult { text: String },
    SkillStarting { skill_name: String },
    SkillConnected { skill_name: String, tool_count: usize },
    SkillDisconnected { skill_name: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeEvent {
    pub job_id: String,
    pub run_id: String,
    pub timestamp: i64,
    #[serde(flatten)]
    pub kind: RuntimeEventKind,
}

/// 事件监听方收到的事件
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineEvent {
    Run(Box<RunEvent>),
    Runtime(RuntimeEvent),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Expert, ProviderConfig, ProviderName, RunSetting};
    use std::collections::HashMap;

    #[test]
    fn test_run_event_round_trip_keeps_type_tag() {
        let expert = Expert::new("assistant", "help");
        let mut experts = HashMap::new();
        experts.insert(expert.key.clone(), expert.clone());
        let setting = RunSetting::new(
            "assistant",
            "gpt-4o",
            ProviderConfig::new(ProviderName::Openai),
            experts,
        );
        let checkpoint = Checkpoint::init(&setting, &expert);
        let event = RunEvent::new(RunEventKind::CompleteRun {
            checkpoint,
            step: Step::new(1),
            text: "4".to_string(),
            usage: Usage::new(3, 1),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "completeRun");
        assert_eq!(value["expertKey"], "assistant");
        let restored: RunEvent = serde_json::from_value(value).unwrap();
        assert_eq!(restored, event);
    }
}
