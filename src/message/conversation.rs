//! 对话消息与工具调用
//!
//! Message 是对话中的一轮：角色、文本内容、零到多个 ToolCall。
//! 校验器产生的错误消息通过 `is_error` 标记，供重试编排识别并路由到修正步骤。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::PATCH_TOOL_NAME;

/// 消息角色（与 LLM API 一致；Tool 为校验器针对单个调用的诊断消息）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// 工具调用的种类：普通调用或 JSONPatch 修正调用
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Ordinary,
    Correction,
}

/// 单个工具调用请求：id（由 Oracle 分配或合成）、工具名、参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    /// 新建调用并合成 UUID 作为 id
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            args,
        }
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    pub fn kind(&self) -> CallKind {
        if self.name == PATCH_TOOL_NAME {
            CallKind::Correction
        } else {
            CallKind::Ordinary
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Tool 角色消息所回应的调用 id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// 校验失败标记（可机器判定）
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// 带工具调用的 assistant 消息
    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::with_role(Role::Assistant, content)
        }
    }

    /// 针对某个调用的工具结果消息
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    /// 针对某个调用的校验错误消息（is_error = true）
    pub fn tool_error(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::tool(tool_call_id, content).into_error()
    }

    pub fn into_error(mut self) -> Self {
        self.is_error = true;
        self
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// 为缺失的消息 id 与调用 id 补齐 UUID
    pub(crate) fn assign_ids(&mut self) {
        if self.id.is_none() {
            self.id = Some(new_id());
        }
        for call in &mut self.tool_calls {
            if call.id.is_empty() {
                call.id = new_id();
            }
        }
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
