//! 消息模型
//!
//! Message 是 Checkpoint 中只追加的对话记录：Instruction / User / Expert / Tool 四种，
//! 每条消息由有序的 MessagePart（文本、思考、图片、文件、工具调用、工具结果）组成。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ToolResult;

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 媒体内容来源：URL、内联 base64 或原始字节
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MediaSource {
    Url { url: String },
    Inline { data: String },
    Binary { data: Vec<u8> },
}

/// 消息内容片段
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum MessagePart {
    #[serde(rename = "textPart")]
    Text { id: String, text: String },
    /// 模型推理内容（reasoning）
    #[serde(rename = "thinkingPart")]
    Thinking { id: String, thinking: String },
    #[serde(rename = "imagePart")]
    Image {
        id: String,
        mime_type: String,
        source: MediaSource,
    },
    #[serde(rename = "filePart")]
    File {
        id: String,
        mime_type: String,
        source: MediaSource,
    },
    #[serde(rename = "toolCallPart")]
    ToolCall {
        id: String,
        tool_call_id: String,
        tool_name: String,
        args: Value,
    },
    #[serde(rename = "toolResultPart")]
    ToolResult {
        id: String,
        tool_call_id: String,
        tool_name: String,
        contents: Vec<MessagePart>,
        #[serde(default)]
        is_error: bool,
    },
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            id: new_id(),
            text: text.into(),
        }
    }

    pub fn thinking(thinking: impl Into<String>) -> Self {
        Self::Thinking {
            id: new_id(),
            thinking: thinking.into(),
        }
    }

    pub fn tool_call(tool_call_id: impl Into<String>, tool_name: impl Into<String>, args: Value) -> Self {
        Self::ToolCall {
            id: new_id(),
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// 消息类型（序列化为 instructionMessage / userMessage / expertMessage / toolMessage）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "instructionMessage")]
    Instruction,
    #[serde(rename = "userMessage")]
    User,
    #[serde(rename = "expertMessage")]
    Expert,
    #[serde(rename = "toolMessage")]
    Tool,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub role: Role,
    pub contents: Vec<MessagePart>,
}

impl Message {
    pub fn new(role: Role, contents: Vec<MessagePart>) -> Self {
        Self {
            id: new_id(),
            role,
            contents,
        }
    }

    pub fn instruction(text: impl Into<String>) -> Self {
        Self::new(Role::Instruction, vec![MessagePart::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![MessagePart::text(text)])
    }

    pub fn expert(contents: Vec<MessagePart>) -> Self {
        Self::new(Role::Expert, contents)
    }

    /// 将一批工具结果折叠为一条 Tool 消息（顺序与传入一致）
    pub fn tool(results: &[ToolResult]) -> Self {
        let contents = results
            .iter()
            .map(|r| MessagePart::ToolResult {
                id: new_id(),
                tool_call_id: r.id.clone(),
                tool_name: r.tool_name.clone(),
                contents: r.result.clone(),
                is_error: r.is_error,
            })
            .collect();
        Self::new(Role::Tool, contents)
    }

    /// 拼接所有文本片段
    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(MessagePart::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// 本消息中工具调用的 id（按出现顺序）
    pub fn tool_call_ids(&self) -> Vec<&str> {
        self.contents
            .iter()
            .filter_map(|p| match p {
                MessagePart::ToolCall { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_format() {
        let msg = Message::user("hello");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "userMessage");
        assert_eq!(value["contents"][0]["type"], "textPart");
        assert_eq!(value["contents"][0]["text"], "hello");
    }

    #[test]
    fn test_tool_call_part_uses_camel_case_fields() {
        let part = MessagePart::tool_call("call_1", "think", json!({"thought": "x"}));
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value["type"], "toolCallPart");
        assert_eq!(value["toolCallId"], "call_1");
        assert_eq!(value["toolName"], "think");
    }

    #[test]
    fn test_expert_text_concatenates_text_parts() {
        let msg = Message::expert(vec![
            MessagePart::thinking("hmm"),
            MessagePart::text("4"),
            MessagePart::tool_call("c1", "todo", json!({})),
        ]);
        assert_eq!(msg.text(), "4");
        assert_eq!(msg.tool_call_ids(), vec!["c1"]);
    }
}
