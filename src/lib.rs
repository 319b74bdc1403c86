//! Bee Retry - 工具调用的校验与自动修正
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 重试编排状态机、状态、聚合、错误类型
//! - **llm**: Oracle / ChatModel 抽象与实现（文本模式适配 / Mock）
//! - **message**: 对话消息、工具调用、编排输入
//! - **observability**: tracing 初始化与重试事件观察者
//! - **patch**: RFC 6902 JSONPatch（add / replace / remove）
//! - **strategy**: 普通重试与 JSONPatch 修正两种策略的绑定
//! - **tools**: 工具声明、Schema、参数校验

pub mod config;
pub mod core;
pub mod llm;
pub mod message;
pub mod observability;
pub mod patch;
pub mod strategy;
pub mod tools;

pub use crate::config::{load_config, AppConfig, RetrySettings, StrategyKind};
pub use crate::core::{
    AggregateError, Aggregator, FallbackContext, RetryConfig, RetryError, RetryOrchestrator,
    RetryOutcome, ToolError,
};
pub use llm::{ChatModel, LlmClient, Oracle};
pub use message::{Message, PromptValue, RetryInput, Role, ToolCall};
pub use strategy::{bind, bind_from_settings, bind_with_fallback, bind_with_patches, BindOptions};
pub use tools::{SchemaValidator, ToolSpec, Validator};
