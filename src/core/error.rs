//! 引擎错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 EngineError 决定 Retry / ReportToModel / Abort。

use thiserror::Error;

use crate::llm::LlmError;
use crate::skills::SkillError;
use crate::storage::StorageError;

/// 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Config error: {0}")]
    Config(String),

    /// 模型调用了任何技能都未声明的工具
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Delegate expert not found: {0}")]
    DelegateExpertNotFound(String),

    #[error("Skill '{skill}' failed to start: {message}")]
    SkillInit { skill: String, message: String },

    #[error(transparent)]
    Skill(#[from] SkillError),

    #[error("Delegation failed: {0}")]
    Delegation(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run cancelled")]
    Cancelled,
}

impl EngineError {
    /// 写入 stopRunByError 事件时使用的错误名
    pub fn name(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::UnknownTool(_) => "UnknownToolError",
            Self::DelegateExpertNotFound(_) => "DelegateExpertNotFoundError",
            Self::SkillInit { .. } => "SkillInitError",
            Self::Skill(_) => "SkillError",
            Self::Delegation(_) => "DelegationError",
            Self::Llm(_) => "LlmError",
            Self::Storage(_) => "StorageError",
            Self::Serialization(_) => "SerializationError",
            Self::Cancelled => "CancelledError",
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// 消耗一次重试预算，带着原因回到 Generating
    Retry(String),
    /// 作为错误 ToolResult 交给模型，由模型自行修正
    ReportToModel(String),
    /// 终止当前运行
    Abort,
}
