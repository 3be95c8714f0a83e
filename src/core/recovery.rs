//! 错误恢复引擎
//!
//! 根据 EngineError 类型与当前重试次数返回 RecoveryAction，供状态机决定重试、回报模型还是终止。

use crate::core::{EngineError, RecoveryAction};

#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// retry_count 为已消耗的重试次数；达到 max_retries 后可重试错误也会终止
    pub fn handle(&self, err: &EngineError, retry_count: u32, max_retries: u32) -> RecoveryAction {
        match err {
            EngineError::Llm(e) if e.is_retryable && retry_count < max_retries => {
                RecoveryAction::Retry(e.to_string())
            }
            EngineError::Skill(e) if !e.is_config() => RecoveryAction::ReportToModel(e.to_string()),
            _ => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::skills::SkillError;

    #[test]
    fn test_retryable_llm_error_within_budget() {
        let engine = RecoveryEngine::new();
        let err = EngineError::Llm(LlmError::new("RateLimitError", "slow down", Some(429)));
        match engine.handle(&err, 2, 5) {
            RecoveryAction::Retry(msg) => assert!(msg.contains("slow down")),
            other => panic!("Expected Retry, got {other:?}"),
        }
    }

    #[test]
    fn test_retryable_llm_error_exhausted() {
        let engine = RecoveryEngine::new();
        let err = EngineError::Llm(LlmError::new("RateLimitError", "slow down", Some(429)));
        assert_eq!(engine.handle(&err, 5, 5), RecoveryAction::Abort);
    }

    #[test]
    fn test_non_retryable_llm_error() {
        let engine = RecoveryEngine::new();
        let err = EngineError::Llm(LlmError::new("AuthError", "bad key", Some(401)));
        assert_eq!(engine.handle(&err, 0, 5), RecoveryAction::Abort);
    }

    #[test]
    fn test_skill_error_reported_to_model() {
        let engine = RecoveryEngine::new();
        let err = EngineError::Skill(SkillError::Execution("file not found".to_string()));
        assert!(matches!(
            engine.handle(&err, 0, 5),
            RecoveryAction::ReportToModel(_)
        ));
    }

    #[test]
    fn test_skill_config_error_aborts() {
        let engine = RecoveryEngine::new();
        let err = EngineError::Skill(SkillError::Config("missing env".to_string()));
        assert_eq!(engine.handle(&err, 0, 5), RecoveryAction::Abort);
    }

    #[test]
    fn test_unknown_tool_aborts() {
        let engine = RecoveryEngine::new();
        let err = EngineError::UnknownTool("fake_tool".to_string());
        assert_eq!(engine.handle(&err, 0, 5), RecoveryAction::Abort);
    }
}
