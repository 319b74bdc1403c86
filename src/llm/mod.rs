//! LLM 层：Oracle / ChatModel 抽象、文本模式工具调用适配、Mock 实现

pub mod mock;
pub mod prompt_tools;
pub mod traits;

pub use mock::{Binding, MockChatModel, MockLlmClient, ScriptedOracle};
pub use prompt_tools::{parse_reply, PromptToolModel, PromptToolOracle};
pub use traits::{ChatModel, LlmClient, Oracle};
