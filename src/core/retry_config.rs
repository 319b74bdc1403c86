//! 重试策略配置：最大尝试次数、fallback Oracle、聚合器、强制 tool_choice

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::config::RetrySettings;
use crate::core::{Aggregator, LastAssistant};
use crate::llm::Oracle;

/// 修正步骤喂给 fallback 的上下文范围
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackContext {
    /// 仅本次调用生成的消息（含校验错误说明）
    #[default]
    Window,
    /// 调用方历史 + 生成的消息
    FullHistory,
}

/// 重试配置
#[derive(Clone)]
pub struct RetryConfig {
    /// 最大生成次数（primary + fallback 合计），至少为 1
    pub max_attempts: usize,
    /// 修正时使用的 Oracle；为 None 时重新调用 primary
    pub fallback: Option<Arc<dyn Oracle>>,
    pub aggregate: Arc<dyn Aggregator>,
    /// 强制的工具名：设置后即使 Oracle 未给出 tool call 也必须进入校验
    pub tool_choice: Option<String>,
    pub fallback_context: FallbackContext,
}

impl RetryConfig {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            fallback: None,
            aggregate: Arc::new(LastAssistant),
            tool_choice: None,
            fallback_context: FallbackContext::default(),
        }
    }

    /// 从配置文件段构造（fallback 与聚合器仍由调用方或策略绑定）
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            tool_choice: settings.tool_choice.clone(),
            fallback_context: settings.fallback_context,
            ..Self::new(settings.max_attempts)
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn Oracle>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_aggregator(mut self, aggregate: impl Aggregator + 'static) -> Self {
        self.aggregate = Arc::new(aggregate);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: Option<String>) -> Self {
        self.tool_choice = tool_choice;
        self
    }

    pub fn with_fallback_context(mut self, context: FallbackContext) -> Self {
        self.fallback_context = context;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("fallback", &self.fallback.is_some())
            .field("tool_choice", &self.tool_choice)
            .field("fallback_context", &self.fallback_context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyKind;

    #[test]
    fn test_max_attempts_clamped_to_one() {
        assert_eq!(RetryConfig::new(0).max_attempts, 1);
        assert_eq!(RetryConfig::default().max_attempts, 3);
    }

    #[test]
    fn test_from_settings() {
        let settings = RetrySettings {
            max_attempts: 5,
            strategy: StrategyKind::JsonPatch,
            tool_choice: Some("Respond".to_string()),
            fallback_context: FallbackContext::FullHistory,
        };
        let config = RetryConfig::from_settings(&settings);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.tool_choice.as_deref(), Some("Respond"));
        assert_eq!(config.fallback_context, FallbackContext::FullHistory);
        assert!(config.fallback.is_none());
    }
}
