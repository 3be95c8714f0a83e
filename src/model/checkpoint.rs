//! Checkpoint：可持久化、可恢复的运行快照
//!
//! 只由状态机修改，调用方在每次状态转换后持久化。
//! 父子运行之间只通过 id 互相引用（delegatedBy / delegateTo），不持有对方。

use serde::{Deserialize, Serialize};

use crate::model::{
    context_window, Expert, ExpertRef, Message, Role, RunSetting, ToolCall, ToolResult, Usage,
};

/// 运行状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckpointStatus {
    Init,
    Proceeding,
    Completed,
    StoppedByInteractiveTool,
    StoppedByDelegate,
    StoppedByExceededMaxSteps,
    StoppedByError,
}

impl CheckpointStatus {
    /// 等待外部结果后可恢复的停止状态
    pub fn awaits_external_result(&self) -> bool {
        matches!(self, Self::StoppedByDelegate | Self::StoppedByInteractiveTool)
    }
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Proceeding => "proceeding",
            Self::Completed => "completed",
            Self::StoppedByInteractiveTool => "stoppedByInteractiveTool",
            Self::StoppedByDelegate => "stoppedByDelegate",
            Self::StoppedByExceededMaxSteps => "stoppedByExceededMaxSteps",
            Self::StoppedByError => "stoppedByError",
        };
        f.write_str(s)
    }
}

/// 父运行委派出的目标
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationTarget {
    pub expert: ExpertRef,
    pub tool_call_id: String,
    pub tool_name: String,
    pub query: String,
}

/// 子运行指回父运行的链接
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedBy {
    pub expert: ExpertRef,
    pub tool_call_id: String,
    pub tool_name: String,
    pub checkpoint_id: String,
}

/// 运行快照
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: String,
    pub job_id: String,
    pub run_id: String,
    pub status: CheckpointStatus,
    pub step_number: u64,
    pub messages: Vec<Message>,
    pub expert: ExpertRef,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window_usage: Option<f64>,
    /// 尚未解决的工具调用（步内恢复用）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_tool_calls: Option<Vec<ToolCall>>,
    /// 本步已完成的工具结果，恢复后不再重复执行
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_tool_results: Option<Vec<ToolResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_to: Option<Vec<DelegationTarget>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_by: Option<DelegatedBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl Checkpoint {
    /// 全新运行的初始快照（stepNumber 从 1 开始）
    pub fn init(setting: &RunSetting, expert: &Expert) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            job_id: setting.job_id.clone(),
            run_id: setting.run_id.clone(),
            status: CheckpointStatus::Init,
            step_number: 1,
            messages: Vec::new(),
            expert: expert.expert_ref(),
            usage: Usage::default(),
            context_window: context_window(&setting.model),
            context_window_usage: None,
            pending_tool_calls: None,
            partial_tool_results: None,
            delegate_to: None,
            delegated_by: None,
            retry_count: None,
        }
    }

    /// 子运行快照：空消息、零用量、沿用父运行的 stepNumber，并记录回链
    pub fn for_delegation(
        parent: &Checkpoint,
        target: &DelegationTarget,
        child_setting: &RunSetting,
        child_expert: &Expert,
    ) -> Self {
        Self {
            step_number: parent.step_number,
            delegated_by: Some(DelegatedBy {
                expert: parent.expert.clone(),
                tool_call_id: target.tool_call_id.clone(),
                tool_name: target.tool_name.clone(),
                checkpoint_id: parent.id.clone(),
            }),
            ..Self::init(child_setting, child_expert)
        }
    }

    /// 最后一条消息若为 Expert 消息且含文本，返回该文本
    pub fn final_text(&self) -> Option<String> {
        let last = self.messages.last()?;
        if last.role != Role::Expert {
            return None;
        }
        let text = last.text();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// 最近一条 Expert 消息中的工具调用 id 顺序（用于按原始顺序折叠结果）
    pub fn last_tool_call_order(&self) -> Vec<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Expert && !m.tool_call_ids().is_empty())
            .map(|m| m.tool_call_ids().into_iter().map(String::from).collect())
            .unwrap_or_default()
    }
}
