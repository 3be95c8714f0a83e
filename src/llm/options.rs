//! 提供方请求参数
//!
//! 基础参数（ProviderConfig.options）与推理参数深度合并后原样并入请求体。

use serde_json::{json, Map, Value};

use crate::model::{ProviderName, ReasoningBudget, ReasoningLevel};

/// 深度合并：对象逐键递归，其余类型由 overlay 覆盖；overlay 为 null 时保留 base
pub fn merge_options(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => merge_options(existing, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

fn level_tokens(level: ReasoningLevel) -> u64 {
    match level {
        ReasoningLevel::Minimal => 1024,
        ReasoningLevel::Low => 2048,
        ReasoningLevel::Medium => 8192,
        ReasoningLevel::High => 32768,
    }
}

fn tokens_level(tokens: u64) -> ReasoningLevel {
    match tokens {
        0..=1024 => ReasoningLevel::Minimal,
        1025..=2048 => ReasoningLevel::Low,
        2049..=8192 => ReasoningLevel::Medium,
        _ => ReasoningLevel::High,
    }
}

fn level_str(level: ReasoningLevel) -> &'static str {
    match level {
        ReasoningLevel::Minimal => "minimal",
        ReasoningLevel::Low => "low",
        ReasoningLevel::Medium => "medium",
        ReasoningLevel::High => "high",
    }
}

/// 推理预算映射到各提供方的请求字段
pub fn reasoning_options(provider: ProviderName, budget: &ReasoningBudget) -> Value {
    let (level, tokens) = match *budget {
        ReasoningBudget::Tokens(t) => (tokens_level(t), t),
        ReasoningBudget::Level(l) => (l, level_tokens(l)),
    };
    match provider {
        ProviderName::Openai | ProviderName::Deepseek | ProviderName::Ollama => {
            json!({ "reasoning_effort": level_str(level) })
        }
        ProviderName::Anthropic => json!({
            "thinking": { "type": "enabled", "budget_tokens": tokens }
        }),
        ProviderName::Google => json!({
            "thinkingConfig": { "thinkingBudget": tokens, "includeThoughts": true }
        }),
    }
}

/// headers 等不进入请求体的配置不在此处理
pub fn base_options(options: Option<&Value>) -> Value {
    match options {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => Value::Object(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_is_deep() {
        let base = json!({"a": 1, "nested": {"x": 1, "y": 2}});
        let overlay = json!({"b": 2, "nested": {"y": 3}});
        assert_eq!(
            merge_options(base, overlay),
            json!({"a": 1, "b": 2, "nested": {"x": 1, "y": 3}})
        );
    }

    #[test]
    fn test_merge_null_overlay_keeps_base() {
        let base = json!({"a": 1});
        assert_eq!(merge_options(base.clone(), Value::Null), base);
    }

    #[test]
    fn test_reasoning_mapping_per_provider() {
        let high = ReasoningBudget::Level(ReasoningLevel::High);
        assert_eq!(
            reasoning_options(ProviderName::Openai, &high),
            json!({"reasoning_effort": "high"})
        );
        assert_eq!(
            reasoning_options(ProviderName::Anthropic, &ReasoningBudget::Level(ReasoningLevel::Low)),
            json!({"thinking": {"type": "enabled", "budget_tokens": 2048}})
        );
        assert_eq!(
            reasoning_options(ProviderName::Google, &ReasoningBudget::Tokens(500))["thinkingConfig"]
                ["thinkingBudget"],
            json!(500)
        );
        assert_eq!(
            reasoning_options(ProviderName::Deepseek, &ReasoningBudget::Tokens(4000)),
            json!({"reasoning_effort": "medium"})
        );
    }
}
