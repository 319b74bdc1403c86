//! 普通 fallback 策略：校验失败后让同一模型（或单独的 fallback 模型）根据错误说明重新生成
//!
//! 聚合使用默认的 LastAssistant：只保留最后一次尝试。

use std::sync::Arc;

use crate::core::{RetryOrchestrator, ToolError};
use crate::llm::ChatModel;
use crate::strategy::BindOptions;
use crate::tools::ToolSpec;

pub const STRATEGY_NAME: &str = "default";

/// 绑定工具集；修正时重新调用同一个已绑定的 Oracle
pub fn bind(
    model: &dyn ChatModel,
    tools: Vec<ToolSpec>,
    options: BindOptions,
) -> Result<RetryOrchestrator, ToolError> {
    let oracle = model.bind_tools(&tools, options.tool_choice.as_deref());
    let validator = options.validator(tools)?;
    Ok(
        RetryOrchestrator::new(oracle, Arc::new(validator), options.retry_config())
            .with_observer(options.observer())
            .with_strategy_name(STRATEGY_NAME),
    )
}

/// 绑定工具集；修正时改用 fallback 模型（绑定同一工具集）
pub fn bind_with_fallback(
    model: &dyn ChatModel,
    fallback_model: &dyn ChatModel,
    tools: Vec<ToolSpec>,
    options: BindOptions,
) -> Result<RetryOrchestrator, ToolError> {
    let tool_choice = options.tool_choice.as_deref();
    let oracle = model.bind_tools(&tools, tool_choice);
    let fallback = fallback_model.bind_tools(&tools, tool_choice);
    let validator = options.validator(tools)?;
    let config = options.retry_config().with_fallback(fallback);
    Ok(RetryOrchestrator::new(oracle, Arc::new(validator), config)
        .with_observer(options.observer())
        .with_strategy_name(STRATEGY_NAME))
}
