//! 归一化的模型调用错误
//!
//! 各提供方的原始错误统一转换为 LlmError，状态机只看 is_retryable 决定是否消耗重试预算。

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{name}: {message}")]
#[serde(rename_all = "camelCase")]
pub struct LlmError {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub is_retryable: bool,
}

impl LlmError {
    /// 按默认规则判断是否可重试
    pub fn new(name: impl Into<String>, message: impl Into<String>, status_code: Option<u16>) -> Self {
        let message = message.into();
        let is_retryable = default_is_retryable(status_code, &message);
        Self {
            name: name.into(),
            message,
            status_code,
            is_retryable,
        }
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self {
            name: "TimeoutError".to_string(),
            message: format!("model call timed out after {timeout_ms}ms"),
            status_code: None,
            is_retryable: true,
        }
    }

    pub fn non_retryable(mut self) -> Self {
        self.is_retryable = false;
        self
    }
}

/// 408 / 409 / 429 / 5xx、超时与连接错误视为可重试
pub fn default_is_retryable(status_code: Option<u16>, message: &str) -> bool {
    if let Some(code) = status_code {
        if matches!(code, 408 | 409 | 429) || (500..600).contains(&code) {
            return true;
        }
    }
    let lower = message.to_ascii_lowercase();
    lower.contains("timeout") || lower.contains("timed out") || lower.contains("connection")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_classification() {
        assert!(default_is_retryable(Some(429), "rate limited"));
        assert!(default_is_retryable(Some(503), "unavailable"));
        assert!(default_is_retryable(Some(408), ""));
        assert!(!default_is_retryable(Some(400), "bad request"));
        assert!(!default_is_retryable(Some(401), "invalid api key"));
        assert!(default_is_retryable(None, "Connection reset by peer"));
        assert!(default_is_retryable(None, "request timed out"));
        assert!(!default_is_retryable(None, "schema mismatch"));
    }

    #[test]
    fn test_timeout_error_is_retryable() {
        let err = LlmError::timeout(1500);
        assert_eq!(err.name, "TimeoutError");
        assert!(err.is_retryable);
        assert!(err.to_string().contains("1500ms"));
    }
}
