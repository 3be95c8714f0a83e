//! Token 用量统计与上下文窗口占用
//!
//! Usage 的累加是纯函数式折叠（满足交换律与结合律），并行委派时可直接求和，无需加锁。

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// 单次或累计的 token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
    pub total_tokens: u64,
    pub cached_input_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            ..Self::default()
        }
    }

    pub fn with_reasoning(mut self, reasoning_tokens: u64) -> Self {
        self.reasoning_tokens = reasoning_tokens;
        self
    }

    pub fn with_cached_input(mut self, cached_input_tokens: u64) -> Self {
        self.cached_input_tokens = cached_input_tokens;
        self
    }
}

impl Add for Usage {
    type Output = Usage;

    fn add(self, rhs: Usage) -> Usage {
        Usage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
            reasoning_tokens: self.reasoning_tokens + rhs.reasoning_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
            cached_input_tokens: self.cached_input_tokens + rhs.cached_input_tokens,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Usage) {
        *self = *self + rhs;
    }
}

impl Sum for Usage {
    fn sum<I: Iterator<Item = Usage>>(iter: I) -> Self {
        iter.fold(Usage::default(), Add::add)
    }
}

impl<'a> Sum<&'a Usage> for Usage {
    fn sum<I: Iterator<Item = &'a Usage>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// 已知模型的上下文窗口（按前缀匹配，越具体的前缀越靠前）
const CONTEXT_WINDOWS: &[(&str, u64)] = &[
    ("claude-opus-4", 200_000),
    ("claude-sonnet-4", 200_000),
    ("claude-3-7-sonnet", 200_000),
    ("claude-3-5-haiku", 200_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4o-mini", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-5", 400_000),
    ("o4-mini", 200_000),
    ("o3", 200_000),
    ("gemini-2.5-pro", 1_048_576),
    ("gemini-2.5-flash", 1_048_576),
    ("deepseek-chat", 128_000),
    ("deepseek-reasoner", 128_000),
];

/// 查询模型的上下文窗口大小；未知模型返回 None
pub fn context_window(model_id: &str) -> Option<u64> {
    CONTEXT_WINDOWS
        .iter()
        .find(|(prefix, _)| model_id.starts_with(prefix))
        .map(|(_, window)| *window)
}

/// 上下文窗口占用比例：(input + cached input + output) / window
pub fn context_window_usage(usage: &Usage, window: u64) -> f64 {
    if window == 0 {
        return 0.0;
    }
    let used = usage.input_tokens + usage.cached_input_tokens + usage.output_tokens;
    used as f64 / window as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_sum_is_elementwise() {
        let a = Usage::new(10, 5).with_reasoning(2);
        let b = Usage::new(7, 3).with_cached_input(4);
        let total: Usage = [a, b].iter().sum();
        assert_eq!(total.input_tokens, 17);
        assert_eq!(total.output_tokens, 8);
        assert_eq!(total.reasoning_tokens, 2);
        assert_eq!(total.cached_input_tokens, 4);
        assert_eq!(total.total_tokens, 25);
        assert_eq!(a + b, b + a);
    }

    #[test]
    fn test_context_window_lookup() {
        assert_eq!(context_window("gpt-4o-mini-2024-07-18"), Some(128_000));
        assert_eq!(context_window("deepseek-reasoner"), Some(128_000));
        assert_eq!(context_window("my-local-model"), None);
    }

    #[test]
    fn test_context_window_usage_fraction() {
        let usage = Usage::new(1_000, 500).with_cached_input(500);
        let fraction = context_window_usage(&usage, 10_000);
        assert!((fraction - 0.2).abs() < f64::EPSILON);
        assert_eq!(context_window_usage(&usage, 0), 0.0);
    }
}
