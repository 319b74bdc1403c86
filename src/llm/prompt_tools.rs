//! 文本模式工具调用：把纯文本 LlmClient 适配为可绑定工具的 ChatModel
//!
//! 绑定的工具 Schema 拼入 system prompt；历史中的 tool call / 校验结果渲染为文本；
//! 回复中的 `{"tool": "...", "args": {...}}`（```json 代码块或裸 JSON）解析为 ToolCall。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::llm::{ChatModel, LlmClient, Oracle};
use crate::message::{Message, Role, ToolCall};
use crate::tools::{tool_call_schema_json, ToolRegistry, ToolSpec};

/// 由文本客户端构造的 ChatModel
pub struct PromptToolModel {
    llm: Arc<dyn LlmClient>,
}

impl PromptToolModel {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

impl ChatModel for PromptToolModel {
    fn bind_tools(&self, tools: &[ToolSpec], tool_choice: Option<&str>) -> Arc<dyn Oracle> {
        let mut registry = ToolRegistry::new();
        for spec in tools {
            if let Err(e) = registry.register(spec.clone()) {
                tracing::warn!(error = %e, "skipping tool while binding");
            }
        }
        Arc::new(PromptToolOracle {
            llm: Arc::clone(&self.llm),
            system_prompt: build_system_prompt(&registry, tool_choice),
        })
    }
}

/// 绑定了工具集的文本 Oracle
pub struct PromptToolOracle {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl PromptToolOracle {
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

#[async_trait]
impl Oracle for PromptToolOracle {
    async fn invoke(&self, messages: &[Message]) -> Result<Message, String> {
        let mut full = Vec::with_capacity(messages.len() + 1);
        if !self.system_prompt.is_empty() {
            full.push(Message::system(self.system_prompt.clone()));
        }
        full.extend(messages.iter().map(render_message));
        let reply = self.llm.complete(&full).await?;
        Ok(parse_reply(&reply))
    }
}

fn build_system_prompt(registry: &ToolRegistry, tool_choice: Option<&str>) -> String {
    if registry.is_empty() {
        return String::new();
    }
    let mut prompt = format!(
        "You can call the following tools:\n\n{}\n\n\
         To call a tool, reply with exactly one JSON object matching this schema:\n\n{}\n\n\
         Example: {{\"tool\": \"{}\", \"args\": {{...}}}}",
        registry.to_schema_json(),
        tool_call_schema_json(),
        registry.specs()[0].name,
    );
    if let Some(name) = tool_choice {
        prompt.push_str(&format!("\n\nYou MUST call the tool `{name}` in your reply."));
    }
    prompt
}

/// 将结构化消息渲染为纯文本消息
fn render_message(m: &Message) -> Message {
    match m.role {
        Role::Assistant if m.has_tool_calls() => {
            let calls: Vec<String> = m
                .tool_calls
                .iter()
                .map(|c| {
                    serde_json::json!({"id": c.id, "tool": c.name, "args": c.args}).to_string()
                })
                .collect();
            let content = if m.content.is_empty() {
                calls.join("\n")
            } else {
                format!("{}\n{}", m.content, calls.join("\n"))
            };
            Message::assistant(content)
        }
        Role::Tool => Message::user(format!(
            "Tool result for tool_call_id=[{}]:\n{}",
            m.tool_call_id.as_deref().unwrap_or("unknown"),
            m.content
        )),
        _ => Message {
            role: m.role,
            ..Message::user(m.content.clone())
        },
    }
}

#[derive(Deserialize)]
struct TextToolCall {
    tool: String,
    #[serde(default)]
    args: Value,
}

/// 解析回复：找到工具调用 JSON 则生成 ToolCall，否则整段作为文本回复
pub fn parse_reply(output: &str) -> Message {
    let trimmed = output.trim();
    let (prefix, json_str) = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let body = rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
        (&trimmed[..start], body)
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end < start {
            return Message::assistant(trimmed);
        }
        (&trimmed[..start], &trimmed[start..=end])
    } else {
        return Message::assistant(trimmed);
    };

    match serde_json::from_str::<TextToolCall>(json_str) {
        Ok(call) if !call.tool.is_empty() => {
            let args = if call.args.is_null() {
                Value::Object(Default::default())
            } else {
                call.args
            };
            Message::assistant_with_calls(prefix.trim(), vec![ToolCall::new(call.tool, args)])
        }
        Ok(_) => Message::assistant(trimmed),
        Err(e) => {
            tracing::debug!(error = %e, "reply contains JSON that is not a tool call");
            Message::assistant(trimmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use serde_json::json;

    fn respond_spec() -> ToolSpec {
        ToolSpec::new(
            "Respond",
            "Use to generate the response.",
            json!({"type": "object", "properties": {"answer": {"type": "string"}}}),
        )
    }

    #[test]
    fn test_parse_fenced_tool_call() {
        let msg = parse_reply("Sure.\n```json\n{\"tool\": \"Respond\", \"args\": {\"answer\": \"hi\"}}\n```");
        assert_eq!(msg.content, "Sure.");
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].name, "Respond");
        assert_eq!(msg.tool_calls[0].args, json!({"answer": "hi"}));
        assert!(!msg.tool_calls[0].id.is_empty());
    }

    #[test]
    fn test_parse_bare_json_and_plain_text() {
        let msg = parse_reply("{\"tool\": \"Respond\"}");
        assert_eq!(msg.tool_calls[0].args, json!({}));

        let msg = parse_reply("just talking");
        assert!(msg.tool_calls.is_empty());
        assert_eq!(msg.content, "just talking");

        let msg = parse_reply("{\"answer\": 1}");
        assert!(msg.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_bound_oracle_renders_tools_and_history() {
        let llm = Arc::new(MockLlmClient::new(vec![
            "{\"tool\": \"Respond\", \"args\": {\"answer\": \"llama\"}}".to_string(),
        ]));
        let model = PromptToolModel::new(llm.clone());
        let oracle = model.bind_tools(&[respond_spec()], Some("Respond"));

        let history = vec![
            Message::user("hi"),
            Message::assistant_with_calls("", vec![ToolCall::with_id("c1", "Respond", json!({}))]),
            Message::tool_error("c1", "answer is required"),
        ];
        let out = oracle.invoke(&history).await.unwrap();
        assert_eq!(out.tool_calls[0].args, json!({"answer": "llama"}));

        let prompt = &llm.prompts()[0];
        assert_eq!(prompt[0].role, Role::System);
        assert!(prompt[0].content.contains("You MUST call the tool `Respond`"));
        assert!(prompt[2].content.contains("\"id\":\"c1\""));
        assert_eq!(prompt[3].role, Role::User);
        assert!(prompt[3].content.contains("tool_call_id=[c1]"));
    }
}
