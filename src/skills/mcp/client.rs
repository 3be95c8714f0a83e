//! MCP 客户端
//!
//! 只实现 initialize、notifications/initialized、tools/list、tools/call。

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::model::{MediaSource, MessagePart};
use crate::skills::mcp::transport::{initialize_params, Transport};
use crate::skills::SkillError;

/// tools/list 返回的工具描述
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<McpTool>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallToolResult {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    is_error: bool,
}

pub struct McpClient {
    skill: String,
    transport: Arc<dyn Transport>,
}

impl McpClient {
    /// 完成握手后返回可用客户端
    pub async fn connect(skill: &str, transport: Arc<dyn Transport>) -> Result<Self, SkillError> {
        let info = transport.request("initialize", initialize_params()).await?;
        tracing::debug!(
            skill = %skill,
            server = %info["serverInfo"]["name"].as_str().unwrap_or("unknown"),
            "MCP initialized"
        );
        transport
            .notify("notifications/initialized", json!({}))
            .await?;
        Ok(Self {
            skill: skill.to_string(),
            transport,
        })
    }

    /// 按 cursor 翻页取全部工具
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, SkillError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match &cursor {
                Some(c) => json!({ "cursor": c }),
                None => json!({}),
            };
            let raw = self.transport.request("tools/list", params).await?;
            let page: ListToolsResult = serde_json::from_value(raw)
                .map_err(|e| SkillError::Protocol(format!("invalid tools/list result: {e}")))?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    /// isError 为真时以 Execution 错误返回结果文本
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<Vec<MessagePart>, SkillError> {
        let raw = self
            .transport
            .request("tools/call", json!({ "name": name, "arguments": args }))
            .await?;
        let result: CallToolResult = serde_json::from_value(raw)
            .map_err(|e| SkillError::Protocol(format!("invalid tools/call result: {e}")))?;
        let parts: Vec<MessagePart> = result.content.iter().filter_map(content_part).collect();
        if result.is_error {
            let text = parts
                .iter()
                .filter_map(MessagePart::as_text)
                .collect::<Vec<_>>()
                .join("\n");
            return Err(SkillError::Execution(if text.is_empty() {
                format!("{} reported an error from {name}", self.skill)
            } else {
                text
            }));
        }
        Ok(parts)
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }
}

/// MCP content → MessagePart
fn content_part(content: &Value) -> Option<MessagePart> {
    let id = uuid::Uuid::new_v4().to_string();
    let mime = |v: &Value| {
        v["mimeType"]
            .as_str()
            .unwrap_or("application/octet-stream")
            .to_string()
    };
    match content["type"].as_str()? {
        "text" => Some(MessagePart::text(content["text"].as_str().unwrap_or_default())),
        "image" => Some(MessagePart::Image {
            id,
            mime_type: mime(content),
            source: MediaSource::Inline {
                data: content["data"].as_str().unwrap_or_default().to_string(),
            },
        }),
        "audio" => Some(MessagePart::File {
            id,
            mime_type: mime(content),
            source: MediaSource::Inline {
                data: content["data"].as_str().unwrap_or_default().to_string(),
            },
        }),
        "resource" => {
            let resource = &content["resource"];
            if let Some(text) = resource["text"].as_str() {
                Some(MessagePart::text(text))
            } else {
                Some(MessagePart::File {
                    id,
                    mime_type: mime(resource),
                    source: match resource["blob"].as_str() {
                        Some(blob) => MediaSource::Inline {
                            data: blob.to_string(),
                        },
                        None => MediaSource::Url {
                            url: resource["uri"].as_str().unwrap_or_default().to_string(),
                        },
                    },
                })
            }
        }
        "resource_link" => Some(MessagePart::text(
            content["uri"].as_str().unwrap_or_default(),
        )),
        _ => None,
    }
}
