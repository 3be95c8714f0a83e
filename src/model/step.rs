//! Step：单步 generate → call → resolve 的临时工作区，折叠进 Checkpoint 后丢弃

use serde::{Deserialize, Serialize};

use crate::model::{Message, ToolCall, ToolResult, Usage};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub step_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_messages: Option<Vec<Message>>,
    #[serde(default)]
    pub new_messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_tool_results: Option<Vec<ToolResult>>,
    pub usage: Usage,
    pub started_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
}

impl Step {
    pub fn new(step_number: u64) -> Self {
        Self {
            step_number,
            input_messages: None,
            new_messages: Vec::new(),
            tool_calls: None,
            tool_results: None,
            pending_tool_calls: None,
            partial_tool_results: None,
            usage: Usage::default(),
            started_at: chrono::Utc::now().timestamp_millis(),
            finished_at: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(chrono::Utc::now().timestamp_millis());
    }
}
