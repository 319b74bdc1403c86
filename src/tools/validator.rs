//! 工具调用校验
//!
//! Validator 对一组 ToolCall 逐个检查参数：每个失败的调用返回一条 is_error 的 Tool 消息，
//! 全部通过时返回空列表。SchemaValidator 以 jsonschema 编译各工具的参数 Schema，
//! 并可挂接按工具名的语义检查（如字段内容约束）。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde_json::Value;

use crate::core::ToolError;
use crate::message::{Message, ToolCall};
use crate::tools::{ToolRegistry, ToolSpec};

/// 校验器 trait：Schema 在构造时绑定
#[async_trait]
pub trait Validator: Send + Sync {
    async fn check(&self, tool_calls: &[ToolCall]) -> Result<Vec<Message>, String>;
}

/// 单个调用的校验失败详情
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationFailure {
    pub call_id: String,
    pub tool_name: String,
    pub errors: Vec<String>,
}

/// 错误文本格式化：(失败详情, 原调用, 期望 Schema) -> 写回对话的错误说明
pub type ErrorFormatter = Arc<dyn Fn(&ValidationFailure, &ToolCall, &Value) -> String + Send + Sync>;

/// 语义检查：Schema 通过后对参数做额外约束，返回 Err(原因)
pub type SemanticCheck = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

struct CompiledTool {
    spec: ToolSpec,
    schema: JSONSchema,
    checks: Vec<SemanticCheck>,
}

/// 基于 JSON Schema 的校验器
pub struct SchemaValidator {
    tools: HashMap<String, CompiledTool>,
    names: Vec<String>,
    formatter: ErrorFormatter,
}

impl SchemaValidator {
    /// 编译每个工具的参数 Schema；Schema 非法或名称重复时报错
    pub fn new(tools: impl IntoIterator<Item = ToolSpec>) -> Result<Self, ToolError> {
        let registry = ToolRegistry::from_specs(tools)?;
        let mut compiled = HashMap::new();
        for spec in registry.specs() {
            let schema = JSONSchema::compile(&spec.parameters).map_err(|e| ToolError::InvalidSchema {
                tool: spec.name.clone(),
                reason: e.to_string(),
            })?;
            compiled.insert(
                spec.name.clone(),
                CompiledTool {
                    spec: spec.clone(),
                    schema,
                    checks: Vec::new(),
                },
            );
        }
        Ok(Self {
            tools: compiled,
            names: registry.tool_names(),
            formatter: Arc::new(default_format_error),
        })
    }

    /// 为指定工具追加语义检查；工具未注册时忽略
    pub fn with_check(
        mut self,
        tool: &str,
        check: impl Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        match self.tools.get_mut(tool) {
            Some(compiled) => compiled.checks.push(Arc::new(check)),
            None => tracing::warn!(tool, "semantic check registered for unknown tool, ignored"),
        }
        self
    }

    pub fn with_formatter(
        mut self,
        formatter: impl Fn(&ValidationFailure, &ToolCall, &Value) -> String + Send + Sync + 'static,
    ) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    pub fn tool_names(&self) -> &[String] {
        &self.names
    }

    fn validate_call(&self, call: &ToolCall) -> Option<Message> {
        let Some(tool) = self.tools.get(&call.name) else {
            return Some(Message::tool_error(
                call.id.clone(),
                format!(
                    "Error: Unrecognized tool name: {:?}. Available tools: {}. Please fix your mistakes.",
                    call.name,
                    self.names.join(", ")
                ),
            ));
        };

        let mut errors: Vec<String> = match tool.schema.validate(&call.args) {
            Ok(()) => Vec::new(),
            Err(iter) => iter
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect(),
        };
        if errors.is_empty() {
            errors = tool
                .checks
                .iter()
                .filter_map(|check| check(&call.args).err())
                .collect();
        }
        if errors.is_empty() {
            return None;
        }

        let failure = ValidationFailure {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            errors,
        };
        let text = (self.formatter)(&failure, call, &tool.spec.parameters);
        Some(Message::tool_error(call.id.clone(), text))
    }
}

#[async_trait]
impl Validator for SchemaValidator {
    async fn check(&self, tool_calls: &[ToolCall]) -> Result<Vec<Message>, String> {
        Ok(tool_calls
            .iter()
            .filter_map(|call| self.validate_call(call))
            .collect())
    }
}

/// 默认错误格式：列出错误并要求修正后重新回复
pub fn default_format_error(failure: &ValidationFailure, _call: &ToolCall, _schema: &Value) -> String {
    format!(
        "ValidationError for {}:\n{}\n\nRespond after fixing all validation errors.",
        failure.tool_name,
        failure
            .errors
            .iter()
            .map(|e| format!("- {e}"))
            .collect::<Vec<_>>()
            .join("\n")
    )
}
