//! 脚本化提供方（用于测试，无需 API）
//!
//! 按顺序返回预先排好的回复；可按指令文本子串分流，便于并行委派时给不同 Expert 不同脚本。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::traits::response_parts;
use crate::llm::{
    FinishReason, GenerateRequest, GenerateResponse, GeneratedToolCall, LlmError, PartStream,
    ProviderAdapter, StreamPart,
};
use crate::model::{ProviderName, Role, Usage};

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Response(GenerateResponse),
    Error(LlmError),
    Stream(Vec<StreamPart>),
    /// 挂起指定时长后返回空响应（用于超时测试）
    Delay(Duration),
}

#[derive(Default)]
struct Script {
    default: VecDeque<ScriptedReply>,
    routes: Vec<(String, VecDeque<ScriptedReply>)>,
    requests: Vec<GenerateRequest>,
}

pub struct ScriptedProvider {
    name: ProviderName,
    script: Mutex<Script>,
}

impl ScriptedProvider {
    pub fn new(name: ProviderName) -> Self {
        Self {
            name,
            script: Mutex::new(Script::default()),
        }
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, reply: ScriptedReply) -> &Self {
        self.script().default.push_back(reply);
        self
    }

    pub fn push_response(&self, response: GenerateResponse) -> &Self {
        self.push(ScriptedReply::Response(response))
    }

    pub fn push_error(&self, error: LlmError) -> &Self {
        self.push(ScriptedReply::Error(error))
    }

    pub fn push_stream(&self, parts: Vec<StreamPart>) -> &Self {
        self.push(ScriptedReply::Stream(parts))
    }

    pub fn push_delay(&self, delay: Duration) -> &Self {
        self.push(ScriptedReply::Delay(delay))
    }

    /// 指令消息包含 needle 的请求使用这组回复
    pub fn on_instruction(&self, needle: impl Into<String>, replies: Vec<ScriptedReply>) -> &Self {
        self.script().routes.push((needle.into(), replies.into()));
        self
    }

    /// 已收到的请求（按到达顺序）
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.script().requests.clone()
    }

    fn next_reply(&self, request: &GenerateRequest) -> ScriptedReply {
        let mut script = self.script();
        script.requests.push(request.clone());
        let instruction = request
            .messages
            .iter()
            .find(|m| m.role == Role::Instruction)
            .map(|m| m.text())
            .unwrap_or_default();
        let routed = script
            .routes
            .iter_mut()
            .find(|(needle, _)| instruction.contains(needle.as_str()))
            .map(|(_, replies)| replies.pop_front());
        let reply = match routed {
            Some(reply) => reply,
            None => script.default.pop_front(),
        };
        reply.unwrap_or_else(|| {
            ScriptedReply::Error(
                LlmError::new("ScriptExhausted", "no scripted reply left", None).non_retryable(),
            )
        })
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn name(&self) -> ProviderName {
        self.name
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        match self.next_reply(request) {
            ScriptedReply::Response(response) => Ok(response),
            ScriptedReply::Error(error) => Err(error.into()),
            ScriptedReply::Stream(_) => anyhow::bail!("stream reply scripted for a generate call"),
            ScriptedReply::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Ok(GenerateResponse::default())
            }
        }
    }

    async fn stream(&self, request: &GenerateRequest) -> anyhow::Result<PartStream> {
        let parts = match self.next_reply(request) {
            ScriptedReply::Response(response) => response_parts(response),
            ScriptedReply::Error(error) => return Err(error.into()),
            ScriptedReply::Stream(parts) => parts,
            ScriptedReply::Delay(delay) => {
                tokio::time::sleep(delay).await;
                Vec::new()
            }
        };
        Ok(Box::pin(stream::iter(parts.into_iter().map(Ok))))
    }
}

impl GenerateResponse {
    /// 仅含最终文本的回复
    pub fn text(text: impl Into<String>, usage: Usage) -> Self {
        Self {
            text: text.into(),
            finish_reason: FinishReason::Stop,
            usage,
            ..Self::default()
        }
    }

    /// 仅含工具调用的回复：(id, tool_name, args)
    pub fn tool_calls(calls: Vec<(&str, &str, serde_json::Value)>, usage: Usage) -> Self {
        Self {
            tool_calls: calls
                .into_iter()
                .map(|(id, tool_name, args)| GeneratedToolCall {
                    id: id.to_string(),
                    tool_name: tool_name.to_string(),
                    args,
                })
                .collect(),
            finish_reason: FinishReason::ToolCalls,
            usage,
            ..Self::default()
        }
    }
}
