//! LLM 执行器
//!
//! 包装 ProviderAdapter：合并请求参数、施加超时、归一化错误；流式模式下按
//! 「推理 → 结果」的严格顺序转发 RuntimeEvent。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;

use crate::llm::options::merge_options;
use crate::llm::{
    FinishReason, GenerateRequest, GenerateResponse, GeneratedToolCall, LlmError, ProviderAdapter,
    StreamPart,
};
use crate::model::{Message, RunSetting, RuntimeEventKind, ToolDefinition, Usage};

pub struct LlmExecutor {
    adapter: Arc<dyn ProviderAdapter>,
    model: String,
    temperature: f32,
    timeout_ms: u64,
    options: Value,
}

impl LlmExecutor {
    pub fn new(adapter: Arc<dyn ProviderAdapter>, setting: &RunSetting) -> Self {
        let reasoning = setting
            .reasoning_budget
            .map(|budget| adapter.reasoning_options(&budget))
            .unwrap_or(Value::Null);
        let options = merge_options(adapter.provider_options(&setting.provider_config), reasoning);
        Self {
            adapter,
            model: setting.model.clone(),
            temperature: setting.temperature,
            timeout_ms: setting.timeout_ms,
            options,
        }
    }

    pub fn request(&self, messages: Vec<Message>, tools: Vec<ToolDefinition>) -> GenerateRequest {
        GenerateRequest {
            model: self.model.clone(),
            messages,
            tools,
            temperature: self.temperature,
            provider_options: self.options.clone(),
        }
    }

    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let call = self.adapter.generate(request);
        match tokio::time::timeout(Duration::from_millis(self.timeout_ms), call).await {
            Err(_) => Err(LlmError::timeout(self.timeout_ms)),
            Ok(Err(e)) => Err(self.adapter.normalize_error(&e)),
            Ok(Ok(response)) => Ok(response),
        }
    }

    /// 流式生成；on_event 按顺序收到推理与结果增量
    pub async fn stream(
        &self,
        request: &GenerateRequest,
        on_event: &(dyn Fn(RuntimeEventKind) + Send + Sync),
    ) -> Result<GenerateResponse, LlmError> {
        let run = async {
            let mut parts = self.adapter.stream(request).await?;
            let mut phases = StreamPhases::new(on_event);
            let mut acc = ResponseAccumulator::default();
            while let Some(part) = parts.next().await {
                let part = part?;
                phases.observe(&part);
                acc.push(part);
            }
            phases.finish();
            Ok::<_, anyhow::Error>(acc.into_response())
        };
        match tokio::time::timeout(Duration::from_millis(self.timeout_ms), run).await {
            Err(_) => Err(LlmError::timeout(self.timeout_ms)),
            Ok(Err(e)) => Err(self.adapter.normalize_error(&e)),
            Ok(Ok(response)) => Ok(response),
        }
    }
}

/// 保证推理事件全部早于结果事件
struct StreamPhases<'a> {
    on_event: &'a (dyn Fn(RuntimeEventKind) + Send + Sync),
    reasoning: String,
    reasoning_started: bool,
    reasoning_done: bool,
    result: String,
    result_started: bool,
}

impl<'a> StreamPhases<'a> {
    fn new(on_event: &'a (dyn Fn(RuntimeEventKind) + Send + Sync)) -> Self {
        Self {
            on_event,
            reasoning: String::new(),
            reasoning_started: false,
            reasoning_done: false,
            result: String::new(),
            result_started: false,
        }
    }

    fn observe(&mut self, part: &StreamPart) {
        match part {
            StreamPart::ReasoningDelta(delta) => {
                // 结果阶段开始后到达的推理不再转发
                if self.result_started || self.reasoning_done {
                    return;
                }
                if !self.reasoning_started {
                    self.reasoning_started = true;
                    (self.on_event)(RuntimeEventKind::StartReasoning);
                }
                self.reasoning.push_str(delta);
                (self.on_event)(RuntimeEventKind::StreamReasoning {
                    delta: delta.clone(),
                });
            }
            StreamPart::ReasoningEnd => self.close_reasoning(),
            StreamPart::TextDelta(delta) => {
                self.close_reasoning();
                if !self.result_started {
                    self.result_started = true;
                    (self.on_event)(RuntimeEventKind::StartRunResult);
                }
                self.result.push_str(delta);
                (self.on_event)(RuntimeEventKind::StreamRunResult {
                    delta: delta.clone(),
                });
            }
            StreamPart::ToolCallDelta { .. } | StreamPart::Usage(_) | StreamPart::Finish(_) => {}
        }
    }

    fn close_reasoning(&mut self) {
        if self.reasoning_started && !self.reasoning_done {
            self.reasoning_done = true;
            (self.on_event)(RuntimeEventKind::CompleteReasoning {
                text: self.reasoning.clone(),
            });
        }
    }

    fn finish(&mut self) {
        self.close_reasoning();
        if self.result_started {
            (self.on_event)(RuntimeEventKind::CompleteRunResult {
                text: self.result.clone(),
            });
        }
    }
}

#[derive(Default)]
struct PartialCall {
    id: String,
    name: String,
    args: String,
}

#[derive(Default)]
struct ResponseAccumulator {
    text: String,
    reasoning: String,
    calls: BTreeMap<usize, PartialCall>,
    usage: Usage,
    finish_reason: Option<FinishReason>,
}

impl ResponseAccumulator {
    fn push(&mut self, part: StreamPart) {
        match part {
            StreamPart::ReasoningDelta(delta) => self.reasoning.push_str(&delta),
            StreamPart::ReasoningEnd => {}
            StreamPart::TextDelta(delta) => self.text.push_str(&delta),
            StreamPart::ToolCallDelta {
                index,
                id,
                name,
                args_delta,
            } => {
                let call = self.calls.entry(index).or_default();
                if let Some(id) = id {
                    call.id = id;
                }
                if let Some(name) = name {
                    call.name.push_str(&name);
                }
                call.args.push_str(&args_delta);
            }
            StreamPart::Usage(usage) => self.usage += usage,
            StreamPart::Finish(reason) => self.finish_reason = Some(reason),
        }
    }

    fn into_response(self) -> GenerateResponse {
        let tool_calls: Vec<GeneratedToolCall> = self
            .calls
            .into_values()
            .map(|c| GeneratedToolCall {
                id: if c.id.is_empty() {
                    uuid::Uuid::new_v4().to_string()
                } else {
                    c.id
                },
                tool_name: c.name,
                args: parse_args(&c.args),
            })
            .collect();
        let finish_reason = self.finish_reason.unwrap_or(if tool_calls.is_empty() {
            FinishReason::Stop
        } else {
            FinishReason::ToolCalls
        });
        GenerateResponse {
            text: self.text,
            reasoning: (!self.reasoning.is_empty()).then_some(self.reasoning),
            tool_calls,
            finish_reason,
            usage: self.usage,
        }
    }
}

/// 空参数视为 {}；无法解析时保留原始字符串交给工具报错
pub fn parse_args(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
