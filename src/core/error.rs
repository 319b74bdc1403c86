//! 错误类型
//!
//! RetryError 为编排边界对外抛出的致命错误；可恢复错误（校验失败、Patch 失败、
//! 引用不存在的调用）一律以 is_error 消息写回对话窗口，不会越过编排边界。

use thiserror::Error;

use crate::patch::PatchError;

/// 编排器对调用方可见的错误
#[derive(Error, Debug)]
pub enum RetryError {
    /// 重试次数耗尽：需包含配置上限
    #[error("Could not extract a valid value in {max_attempts} attempts ({attempts} generation calls made)")]
    AttemptsExhausted { max_attempts: usize, attempts: usize },

    /// 输入既不是消息列表也不是结构化 Prompt
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Oracle error: {0}")]
    Oracle(String),

    #[error("Validator error: {0}")]
    Validator(String),
}

/// 工具声明 / Schema 编译错误（构造期）
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid schema for tool {tool}: {reason}")]
    InvalidSchema { tool: String, reason: String },

    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),
}

/// 聚合失败：由编排器转为校验错误消息后进入修正步骤
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    #[error("No assistant message found in the generated messages")]
    NoAssistantMessage,

    #[error("Correction call {call_id} has malformed arguments: {reason}")]
    MalformedCorrection { call_id: String, reason: String },

    #[error("Correction call {call_id} has no earlier tool call to patch")]
    NothingToPatch { call_id: String },

    #[error("Could not apply patches from correction call {call_id} to tool call {target_id}: {source}")]
    Patch {
        call_id: String,
        target_id: String,
        #[source]
        source: PatchError,
    },
}

impl AggregateError {
    /// 错误所对应的调用 id（写回 Tool 消息时使用）
    pub fn call_id(&self) -> Option<&str> {
        match self {
            AggregateError::NoAssistantMessage => None,
            AggregateError::MalformedCorrection { call_id, .. }
            | AggregateError::NothingToPatch { call_id }
            | AggregateError::Patch { call_id, .. } => Some(call_id),
        }
    }
}
