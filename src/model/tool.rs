//! 工具调用与工具结果
//!
//! ToolCall 的 id 由模型（或调用方）给出；ToolResult 必须引用同一步中相同 id 的 ToolCall。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::MessagePart;

/// 一次工具调用：所属技能 + 工具名 + 参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub skill_name: String,
    pub tool_name: String,
    pub args: Value,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        skill_name: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
    ) -> Self {
        Self {
            id: id.into(),
            skill_name: skill_name.into(),
            tool_name: tool_name.into(),
            args,
        }
    }
}

/// 工具结果：与调用相同的 (id, skill, tool) 三元组 + 内容片段
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub id: String,
    pub skill_name: String,
    pub tool_name: String,
    pub result: Vec<MessagePart>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn new(call: &ToolCall, result: Vec<MessagePart>) -> Self {
        Self {
            id: call.id.clone(),
            skill_name: call.skill_name.clone(),
            tool_name: call.tool_name.clone(),
            result,
            is_error: false,
        }
    }

    /// 以错误文本作为结果，模型可在下一轮看到并自行修正
    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::new(call, vec![MessagePart::text(message)])
        }
    }

    pub fn text(&self) -> String {
        self.result
            .iter()
            .filter_map(MessagePart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// 工具定义：由 Skill Manager 声明，传给模型
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub skill_name: String,
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(default)]
    pub interactive: bool,
}
