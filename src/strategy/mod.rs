//! 重试策略：把工具集绑定到模型并构造编排器
//!
//! - plain：校验失败后整段重新生成（同一模型或单独的 fallback 模型）
//! - jsonpatch：fallback 只绑定修正工具，以 JSONPatch 增量修正失败的参数

pub mod jsonpatch;
pub mod plain;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{RetrySettings, StrategyKind};
use crate::core::{FallbackContext, RetryConfig, RetryOrchestrator, ToolError};
use crate::llm::ChatModel;
use crate::observability::{NoopObserver, RetryObserver};
use crate::tools::{SchemaValidator, SemanticCheck, ToolSpec};

pub use jsonpatch::{bind_with_patches, format_patch_error, PatchAggregator};
pub use plain::{bind, bind_with_fallback};

/// 绑定选项：强制工具、最大尝试次数、fallback 上下文、语义检查、观察者
#[derive(Clone)]
pub struct BindOptions {
    pub tool_choice: Option<String>,
    pub max_attempts: usize,
    pub fallback_context: FallbackContext,
    checks: Vec<(String, SemanticCheck)>,
    observer: Arc<dyn RetryObserver>,
}

impl BindOptions {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            tool_choice: None,
            max_attempts,
            fallback_context: FallbackContext::default(),
            checks: Vec::new(),
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            tool_choice: settings.tool_choice.clone(),
            fallback_context: settings.fallback_context,
            ..Self::new(settings.max_attempts)
        }
    }

    pub fn with_tool_choice(mut self, tool_choice: impl Into<String>) -> Self {
        self.tool_choice = Some(tool_choice.into());
        self
    }

    pub fn with_fallback_context(mut self, context: FallbackContext) -> Self {
        self.fallback_context = context;
        self
    }

    /// 为指定工具追加语义检查（Schema 通过后执行）
    pub fn with_check(
        mut self,
        tool: impl Into<String>,
        check: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.checks.push((tool.into(), Arc::new(check)));
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_attempts)
            .with_tool_choice(self.tool_choice.clone())
            .with_fallback_context(self.fallback_context)
    }

    fn validator(&self, tools: Vec<ToolSpec>) -> Result<SchemaValidator, ToolError> {
        let mut validator = SchemaValidator::new(tools)?;
        for (tool, check) in &self.checks {
            let check = Arc::clone(check);
            validator = validator.with_check(tool, move |args| check(args));
        }
        Ok(validator)
    }

    fn observer(&self) -> Arc<dyn RetryObserver> {
        Arc::clone(&self.observer)
    }
}

impl Default for BindOptions {
    fn default() -> Self {
        Self::new(RetrySettings::default().max_attempts)
    }
}

impl fmt::Debug for BindOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindOptions")
            .field("tool_choice", &self.tool_choice)
            .field("max_attempts", &self.max_attempts)
            .field("fallback_context", &self.fallback_context)
            .field("checks", &self.checks.iter().map(|(t, _)| t).collect::<Vec<_>>())
            .finish()
    }
}

/// 按策略类型绑定
pub fn bind_strategy(
    kind: StrategyKind,
    model: &dyn ChatModel,
    tools: Vec<ToolSpec>,
    options: BindOptions,
) -> Result<RetryOrchestrator, ToolError> {
    match kind {
        StrategyKind::Plain => bind(model, tools, options),
        StrategyKind::JsonPatch => bind_with_patches(model, tools, options),
    }
}

/// 按配置文件 [retry] 段选择策略并绑定
pub fn bind_from_settings(
    model: &dyn ChatModel,
    tools: Vec<ToolSpec>,
    settings: &RetrySettings,
) -> Result<RetryOrchestrator, ToolError> {
    bind_strategy(settings.strategy, model, tools, BindOptions::from_settings(settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockChatModel, ScriptedOracle};
    use crate::message::Message;
    use crate::tools::PATCH_TOOL_NAME;
    use serde_json::json;

    fn respond_spec() -> ToolSpec {
        ToolSpec::new("Respond", "", json!({"type": "object"}))
    }

    #[test]
    fn test_options_from_settings() {
        let settings = RetrySettings {
            max_attempts: 4,
            tool_choice: Some("Respond".to_string()),
            ..RetrySettings::default()
        };
        let options = BindOptions::from_settings(&settings);
        assert_eq!(options.max_attempts, 4);
        assert_eq!(options.tool_choice.as_deref(), Some("Respond"));
        assert_eq!(BindOptions::default().max_attempts, 3);
    }

    #[test]
    fn test_bind_from_settings_selects_strategy() {
        let model = MockChatModel::new(Arc::new(ScriptedOracle::always(Message::assistant("x"))));

        let default_engine =
            bind_from_settings(&model, vec![respond_spec()], &RetrySettings::default()).unwrap();
        assert_eq!(default_engine.strategy_name(), plain::STRATEGY_NAME);

        let settings = RetrySettings {
            strategy: StrategyKind::JsonPatch,
            ..RetrySettings::default()
        };
        let patched = bind_from_settings(&model, vec![respond_spec()], &settings).unwrap();
        assert_eq!(patched.strategy_name(), jsonpatch::STRATEGY_NAME);
        assert!(patched.config().fallback.is_some());

        let bindings = model.bindings();
        assert_eq!(bindings.last().unwrap().tools, vec![PATCH_TOOL_NAME.to_string()]);
    }
}
