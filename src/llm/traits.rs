//! 模型提供方抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Scripted）实现 ProviderAdapter：generate（非流式）、stream（流式片段）。
//! 错误在边界处用 anyhow 承载，再由 normalize_error 归一化为 LlmError。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{stream, Stream};
use serde_json::Value;

use crate::llm::options::{base_options, reasoning_options};
use crate::llm::{default_is_retryable, LlmError};
use crate::model::{Message, ProviderConfig, ProviderName, ReasoningBudget, ToolDefinition, Usage};

/// 一次模型调用的输入
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// 为空时不向模型提供工具
    pub tools: Vec<ToolDefinition>,
    pub temperature: f32,
    /// 合并进请求体的额外参数
    pub provider_options: Value,
}

/// 模型返回的工具调用（尚未归属技能）
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedToolCall {
    pub id: String,
    pub tool_name: String,
    pub args: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinishReason {
    #[default]
    Stop,
    /// 输出长度超限
    Length,
    ToolCalls,
    ContentFilter,
    Error,
    Other,
}

impl FinishReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" => Self::Stop,
            "length" | "max_tokens" => Self::Length,
            "tool_calls" | "tool_use" | "function_call" => Self::ToolCalls,
            "content_filter" => Self::ContentFilter,
            "error" => Self::Error,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateResponse {
    pub text: String,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<GeneratedToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// 流式片段
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPart {
    ReasoningDelta(String),
    /// 提供方显式给出的推理结束信号
    ReasoningEnd,
    TextDelta(String),
    /// 同一 index 的多个片段拼接为一个工具调用
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        args_delta: String,
    },
    Usage(Usage),
    Finish(FinishReason),
}

pub type PartStream = Pin<Box<dyn Stream<Item = anyhow::Result<StreamPart>> + Send>>;

/// 提供方适配器
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> ProviderName;

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;

    /// 默认把一次完整生成拆成片段
    async fn stream(&self, request: &GenerateRequest) -> anyhow::Result<PartStream> {
        let response = self.generate(request).await?;
        Ok(Box::pin(stream::iter(response_parts(response).into_iter().map(Ok))))
    }

    fn provider_options(&self, config: &ProviderConfig) -> Value {
        base_options(config.options.as_ref())
    }

    fn reasoning_options(&self, budget: &ReasoningBudget) -> Value {
        reasoning_options(self.name(), budget)
    }

    fn is_retryable(&self, err: &anyhow::Error) -> bool {
        default_is_retryable(None, &err.to_string())
    }

    fn normalize_error(&self, err: &anyhow::Error) -> LlmError {
        if let Some(e) = err.downcast_ref::<LlmError>() {
            return e.clone();
        }
        LlmError {
            name: "ProviderError".to_string(),
            message: err.to_string(),
            status_code: None,
            is_retryable: self.is_retryable(err),
        }
    }
}

/// 完整响应 → 有序片段（推理在前、文本其次、工具调用、用量、结束）
pub fn response_parts(response: GenerateResponse) -> Vec<StreamPart> {
    let mut parts = Vec::new();
    if let Some(reasoning) = response.reasoning.filter(|r| !r.is_empty()) {
        parts.push(StreamPart::ReasoningDelta(reasoning));
        parts.push(StreamPart::ReasoningEnd);
    }
    if !response.text.is_empty() {
        parts.push(StreamPart::TextDelta(response.text));
    }
    for (index, call) in response.tool_calls.into_iter().enumerate() {
        parts.push(StreamPart::ToolCallDelta {
            index,
            id: Some(call.id),
            name: Some(call.tool_name),
            args_delta: call.args.to_string(),
        });
    }
    parts.push(StreamPart::Usage(response.usage));
    parts.push(StreamPart::Finish(response.finish_reason));
    parts
}
