//! DeepSeek 适配器（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat (常规对话), deepseek-reasoner (思考模式，推理内容走 reasoning_content)

use crate::llm::OpenAiAdapter;
use crate::model::ProviderName;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 创建 DeepSeek 适配器
///
/// - 优先使用传入的 key，其次环境变量 `DEEPSEEK_API_KEY`、`OPENAI_API_KEY`
/// - base_url 未指定时使用官方地址
pub fn create_deepseek_adapter(base_url: Option<&str>, api_key: Option<&str>) -> OpenAiAdapter {
    let api_key = api_key
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_API_KEY").ok())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());

    OpenAiAdapter::with_provider(
        ProviderName::Deepseek,
        Some(base_url.unwrap_or(DEEPSEEK_BASE_URL)),
        api_key.as_deref(),
    )
}
