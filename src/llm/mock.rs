//! Mock Oracle / ChatModel / LlmClient（用于测试，无需 API）
//!
//! ScriptedOracle 按顺序返回预设消息，用完后重复最后一条；记录调用次数与每次收到的输入。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm::{ChatModel, LlmClient, Oracle};
use crate::message::Message;
use crate::tools::ToolSpec;

/// 脚本化 Oracle
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    responses: Vec<Message>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedOracle {
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses,
            ..Self::default()
        }
    }

    /// 每次都返回同一条消息
    pub fn always(response: Message) -> Self {
        Self::new(vec![response])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的消息序列
    pub fn inputs(&self) -> Vec<Vec<Message>> {
        self.inputs.lock().map(|i| i.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn invoke(&self, messages: &[Message]) -> Result<Message, String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut inputs) = self.inputs.lock() {
            inputs.push(messages.to_vec());
        }
        self.responses
            .get(n)
            .or_else(|| self.responses.last())
            .cloned()
            .ok_or_else(|| "scripted oracle has no responses".to_string())
    }
}

/// 一次 bind_tools 调用的记录
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub tools: Vec<String>,
    pub tool_choice: Option<String>,
}

/// Mock 聊天模型：按首个绑定工具名路由到不同的 ScriptedOracle，未命中时用默认 Oracle
pub struct MockChatModel {
    default: Arc<ScriptedOracle>,
    routes: HashMap<String, Arc<ScriptedOracle>>,
    bindings: Mutex<Vec<Binding>>,
}

impl MockChatModel {
    pub fn new(default: Arc<ScriptedOracle>) -> Self {
        Self {
            default,
            routes: HashMap::new(),
            bindings: Mutex::new(Vec::new()),
        }
    }

    /// 绑定工具集以 `tool` 开头时返回 `oracle`
    pub fn route(mut self, tool: impl Into<String>, oracle: Arc<ScriptedOracle>) -> Self {
        self.routes.insert(tool.into(), oracle);
        self
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.bindings.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

impl ChatModel for MockChatModel {
    fn bind_tools(&self, tools: &[ToolSpec], tool_choice: Option<&str>) -> Arc<dyn Oracle> {
        if let Ok(mut bindings) = self.bindings.lock() {
            bindings.push(Binding {
                tools: tools.iter().map(|t| t.name.clone()).collect(),
                tool_choice: tool_choice.map(String::from),
            });
        }
        let oracle = tools
            .first()
            .and_then(|t| self.routes.get(&t.name))
            .unwrap_or(&self.default);
        oracle.clone()
    }
}

/// Mock 文本客户端：按顺序返回预设回复，用完后重复最后一条；无预设时回显最后一条 User 消息
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Vec<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(messages.to_vec());
        }
        if let Some(reply) = self.replies.get(n).or_else(|| self.replies.last()) {
            return Ok(reply.clone());
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::message::Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {last_user}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::correction_tool;

    #[tokio::test]
    async fn test_scripted_oracle_repeats_last() {
        let oracle = ScriptedOracle::new(vec![Message::assistant("a"), Message::assistant("b")]);
        let out: Vec<String> = vec![
            oracle.invoke(&[]).await.unwrap().content,
            oracle.invoke(&[]).await.unwrap().content,
            oracle.invoke(&[]).await.unwrap().content,
        ];
        assert_eq!(out, vec!["a", "b", "b"]);
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_script_errors() {
        let oracle = ScriptedOracle::default();
        assert!(oracle.invoke(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_model_routes_by_first_tool() {
        let primary = Arc::new(ScriptedOracle::always(Message::assistant("primary")));
        let fixer = Arc::new(ScriptedOracle::always(Message::assistant("fixer")));
        let correction = correction_tool();
        let model = MockChatModel::new(primary).route(correction.name.clone(), fixer);

        let bound = model.bind_tools(&[correction], None);
        assert_eq!(bound.invoke(&[]).await.unwrap().content, "fixer");
        let bound = model.bind_tools(&[], Some("Respond"));
        assert_eq!(bound.invoke(&[]).await.unwrap().content, "primary");
        assert_eq!(model.bindings()[1].tool_choice.as_deref(), Some("Respond"));
    }

    #[tokio::test]
    async fn test_mock_llm_client_echo() {
        let client = MockLlmClient::default();
        let reply = client.complete(&[Message::user("hello")]).await.unwrap();
        assert_eq!(reply, "Echo from Mock: hello");
    }
}
