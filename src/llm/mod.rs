//! LLM 层：提供方抽象、错误归一化、请求参数合并、执行器与实现（OpenAI 兼容 / DeepSeek / Scripted）

pub mod deepseek;
pub mod error;
pub mod executor;
pub mod mock;
pub mod openai;
pub mod options;
pub mod traits;

use std::sync::Arc;

pub use deepseek::{create_deepseek_adapter, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use error::{default_is_retryable, LlmError};
pub use executor::LlmExecutor;
pub use mock::{ScriptedProvider, ScriptedReply};
pub use openai::OpenAiAdapter;
pub use options::{merge_options, reasoning_options};
pub use traits::{
    FinishReason, GenerateRequest, GenerateResponse, GeneratedToolCall, PartStream,
    ProviderAdapter, StreamPart,
};

use crate::model::{ProviderConfig, ProviderName};

/// 按提供方名称创建适配器；非 OpenAI 原生的提供方通过其 OpenAI 兼容端点访问
pub fn create_adapter(config: &ProviderConfig) -> Arc<dyn ProviderAdapter> {
    match config.provider_name {
        ProviderName::Deepseek => Arc::new(create_deepseek_adapter(
            config.base_url.as_deref(),
            config.api_key.as_deref(),
        )),
        _ => Arc::new(OpenAiAdapter::from_config(config)),
    }
}
