//! LLM 抽象
//!
//! - Oracle：接收有序消息，返回一条新消息（可能含 tool calls）；工具集在绑定时确定
//! - ChatModel：可绑定工具集（与可选的强制 tool_choice），产出 Oracle
//! - LlmClient：纯文本补全后端，由 PromptToolModel 适配为 ChatModel

use std::sync::Arc;

use async_trait::async_trait;

use crate::message::Message;
use crate::tools::ToolSpec;

/// 生成式 Oracle：一次调用产出一条候选消息
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn invoke(&self, messages: &[Message]) -> Result<Message, String>;
}

/// 可绑定工具的聊天模型
pub trait ChatModel: Send + Sync {
    /// 绑定工具集与可选的强制 tool_choice，每个 Oracle 实例只绑定一次
    fn bind_tools(&self, tools: &[ToolSpec], tool_choice: Option<&str>) -> Arc<dyn Oracle>;
}

/// 文本补全客户端（非流式）
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;
}
