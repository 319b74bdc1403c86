//! 消息层：对话消息、工具调用、编排输入

pub mod conversation;
pub mod input;

pub use conversation::{CallKind, Message, Role, ToolCall};
pub use input::{InputShape, PromptValue, RetryInput};
