//! OpenAI 兼容 API 适配器
//!
//! 通过 async_openai 的 byot（自带类型）接口发送 JSON 请求，可对接任意 OpenAI 兼容端点
//! （OpenAI、DeepSeek、Ollama、自建代理等）。推理内容读取 `reasoning_content` 字段。

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::Client;
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use serde_json::{json, Map, Value};

use crate::llm::executor::parse_args;
use crate::llm::options::merge_options;
use crate::llm::{
    default_is_retryable, FinishReason, GenerateRequest, GenerateResponse, GeneratedToolCall,
    LlmError, PartStream, ProviderAdapter, StreamPart,
};
use crate::model::{MediaSource, Message, MessagePart, ProviderConfig, ProviderName, Role, Usage};

pub struct OpenAiAdapter {
    client: Client<OpenAIConfig>,
    provider: ProviderName,
}

impl OpenAiAdapter {
    pub fn new(base_url: Option<&str>, api_key: Option<&str>) -> Self {
        Self::with_provider(ProviderName::Openai, base_url, api_key)
    }

    pub fn with_provider(provider: ProviderName, base_url: Option<&str>, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            provider,
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::with_provider(
            config.provider_name,
            config.base_url.as_deref(),
            config.api_key.as_deref(),
        )
    }

    fn body(&self, request: &GenerateRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": to_openai_messages(&request.messages),
            "temperature": request.temperature,
        });
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        if stream {
            body["stream"] = json!(true);
            body["stream_options"] = json!({ "include_usage": true });
        }
        merge_options(body, request.provider_options.clone())
    }
}

fn media_url(mime_type: &str, source: &MediaSource) -> Option<String> {
    match source {
        MediaSource::Url { url } => Some(url.clone()),
        MediaSource::Inline { data } => Some(format!("data:{mime_type};base64,{data}")),
        MediaSource::Binary { .. } => None,
    }
}

fn user_content(parts: &[MessagePart]) -> Value {
    let has_media = parts.iter().any(|p| matches!(p, MessagePart::Image { .. }));
    if !has_media {
        let text: Vec<&str> = parts.iter().filter_map(MessagePart::as_text).collect();
        return Value::String(text.join("\n"));
    }
    let items: Vec<Value> = parts
        .iter()
        .filter_map(|p| match p {
            MessagePart::Text { text, .. } => Some(json!({ "type": "text", "text": text })),
            MessagePart::Image {
                mime_type, source, ..
            } => media_url(mime_type, source)
                .map(|url| json!({ "type": "image_url", "image_url": { "url": url } })),
            _ => None,
        })
        .collect();
    Value::Array(items)
}

fn tool_result_text(contents: &[MessagePart]) -> String {
    contents
        .iter()
        .filter_map(|p| match p {
            MessagePart::Text { text, .. } => Some(text.clone()),
            MessagePart::Image { mime_type, .. } | MessagePart::File { mime_type, .. } => {
                Some(format!("[{mime_type} attachment]"))
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 内部消息 → Chat Completions 消息；思考片段不回传
pub fn to_openai_messages(messages: &[Message]) -> Vec<Value> {
    let mut out = Vec::new();
    for m in messages {
        match m.role {
            Role::Instruction => out.push(json!({ "role": "system", "content": m.text() })),
            Role::User => out.push(json!({ "role": "user", "content": user_content(&m.contents) })),
            Role::Expert => {
                let calls: Vec<Value> = m
                    .contents
                    .iter()
                    .filter_map(|p| match p {
                        MessagePart::ToolCall {
                            tool_call_id,
                            tool_name,
                            args,
                            ..
                        } => Some(json!({
                            "id": tool_call_id,
                            "type": "function",
                            "function": { "name": tool_name, "arguments": args.to_string() },
                        })),
                        _ => None,
                    })
                    .collect();
                let text = m.text();
                let mut msg = Map::new();
                msg.insert("role".into(), json!("assistant"));
                msg.insert(
                    "content".into(),
                    if text.is_empty() { Value::Null } else { Value::String(text) },
                );
                if !calls.is_empty() {
                    msg.insert("tool_calls".into(), Value::Array(calls));
                }
                out.push(Value::Object(msg));
            }
            Role::Tool => {
                for part in &m.contents {
                    if let MessagePart::ToolResult {
                        tool_call_id,
                        contents,
                        ..
                    } = part
                    {
                        out.push(json!({
                            "role": "tool",
                            "tool_call_id": tool_call_id,
                            "content": tool_result_text(contents),
                        }));
                    }
                }
            }
        }
    }
    out
}

fn parse_usage(raw: &Value) -> Usage {
    let n = |v: &Value| v.as_u64().unwrap_or(0);
    Usage::new(n(&raw["prompt_tokens"]), n(&raw["completion_tokens"]))
        .with_reasoning(n(&raw["completion_tokens_details"]["reasoning_tokens"]))
        .with_cached_input(n(&raw["prompt_tokens_details"]["cached_tokens"]))
}

fn parse_response(raw: &Value) -> GenerateResponse {
    let choice = &raw["choices"][0];
    let message = &choice["message"];
    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .map(|c| GeneratedToolCall {
                    id: c["id"].as_str().unwrap_or_default().to_string(),
                    tool_name: c["function"]["name"].as_str().unwrap_or_default().to_string(),
                    args: parse_args(c["function"]["arguments"].as_str().unwrap_or_default()),
                })
                .collect()
        })
        .unwrap_or_default();
    GenerateResponse {
        text: message["content"].as_str().unwrap_or_default().to_string(),
        reasoning: message["reasoning_content"]
            .as_str()
            .filter(|r| !r.is_empty())
            .map(String::from),
        tool_calls,
        finish_reason: FinishReason::parse(choice["finish_reason"].as_str().unwrap_or("stop")),
        usage: raw.get("usage").map(parse_usage).unwrap_or_default(),
    }
}

fn chunk_parts(chunk: &Value) -> Vec<StreamPart> {
    let mut parts = Vec::new();
    let choice = &chunk["choices"][0];
    let delta = &choice["delta"];
    if let Some(r) = delta["reasoning_content"].as_str().filter(|r| !r.is_empty()) {
        parts.push(StreamPart::ReasoningDelta(r.to_string()));
    }
    if let Some(t) = delta["content"].as_str().filter(|t| !t.is_empty()) {
        parts.push(StreamPart::TextDelta(t.to_string()));
    }
    if let Some(calls) = delta["tool_calls"].as_array() {
        for (pos, c) in calls.iter().enumerate() {
            parts.push(StreamPart::ToolCallDelta {
                index: c["index"].as_u64().map(|i| i as usize).unwrap_or(pos),
                id: c["id"].as_str().map(String::from),
                name: c["function"]["name"].as_str().map(String::from),
                args_delta: c["function"]["arguments"].as_str().unwrap_or_default().to_string(),
            });
        }
    }
    if let Some(reason) = choice["finish_reason"].as_str() {
        parts.push(StreamPart::Finish(FinishReason::parse(reason)));
    }
    if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
        parts.push(StreamPart::Usage(parse_usage(usage)));
    }
    parts
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> ProviderName {
        self.provider
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let body = self.body(request, false);
        let raw: Value = self.client.chat().create_byot(body).await?;
        Ok(parse_response(&raw))
    }

    async fn stream(&self, request: &GenerateRequest) -> anyhow::Result<PartStream> {
        let body = self.body(request, true);
        let chunks = self.client.chat().create_stream_byot::<Value, Value>(body).await?;
        let parts = chunks.flat_map(|chunk| {
            let items: Vec<anyhow::Result<StreamPart>> = match chunk {
                Ok(chunk) => chunk_parts(&chunk).into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e.into())],
            };
            stream::iter(items)
        });
        Ok(Box::pin(parts))
    }

    fn normalize_error(&self, err: &anyhow::Error) -> LlmError {
        if let Some(e) = err.downcast_ref::<LlmError>() {
            return e.clone();
        }
        match err.downcast_ref::<OpenAIError>() {
            Some(OpenAIError::Reqwest(e)) => {
                let status = e.status().map(|s| s.as_u16());
                let name = if e.is_timeout() {
                    "TimeoutError"
                } else if e.is_connect() {
                    "ConnectionError"
                } else {
                    "HttpError"
                };
                LlmError {
                    name: name.to_string(),
                    message: e.to_string(),
                    status_code: status,
                    is_retryable: e.is_timeout()
                        || e.is_connect()
                        || default_is_retryable(status, &e.to_string()),
                }
            }
            Some(OpenAIError::ApiError(api)) => {
                let message = api.to_string();
                let status = message.to_ascii_lowercase().contains("rate limit").then_some(429);
                LlmError::new("ApiError", message, status)
            }
            Some(other) => LlmError::new("OpenAIError", other.to_string(), None).non_retryable(),
            None => LlmError::new("ProviderError", err.to_string(), None),
        }
    }
}
