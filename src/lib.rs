//! Hive - 检查点式 LLM Agent 运行引擎
//!
//! 模块划分：
//! - **model**: 用量、消息、工具调用、Expert、RunSetting、Checkpoint、Step、Job、事件
//! - **llm**: 提供方抽象、错误归一化、参数合并、执行器（流式 / 非流式）与实现
//! - **skills**: Skill Manager（基础工具 / MCP / 委派 / 交互式）、注册表与工具执行器
//! - **engine**: 工具分类、状态机、委派编排与引擎入口
//! - **storage**: 存储契约与内存实现
//! - **core**: 引擎错误与恢复策略
//! - **config**: 应用配置加载（TOML + 环境变量）与 experts 文件
//! - **observability**: tracing 初始化

pub mod config;
pub mod core;
pub mod engine;
pub mod llm;
pub mod model;
pub mod observability;
pub mod skills;
pub mod storage;

pub use crate::core::{EngineError, RecoveryAction};
pub use engine::Engine;
