//! 编排输入：扁平消息列表或结构化 Prompt
//!
//! 与 ChatPrompt 模板一致：`("system", ...)` + `("placeholder", "{messages}")`，
//! 渲染后统一为一条消息序列；InputShape 记录调用方原始输入形态。

use serde_json::Value;

use crate::core::RetryError;
use crate::message::{Message, Role};

/// 调用方输入的形态
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputShape {
    /// 扁平消息序列
    List,
    /// 结构化 Prompt（system + 占位消息）
    Prompt,
}

/// 结构化 Prompt：可选 system 提示 + 对话占位消息
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PromptValue {
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

impl PromptValue {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            system: None,
            messages,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// 渲染为扁平消息序列（system 在最前）
    pub fn to_messages(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = &self.system {
            out.push(Message::system(system.clone()));
        }
        out.extend(self.messages.iter().cloned());
        out
    }
}

/// 编排器输入
#[derive(Clone, Debug, PartialEq)]
pub enum RetryInput {
    Messages(Vec<Message>),
    Prompt(PromptValue),
}

impl RetryInput {
    pub fn shape(&self) -> InputShape {
        match self {
            RetryInput::Messages(_) => InputShape::List,
            RetryInput::Prompt(_) => InputShape::Prompt,
        }
    }

    pub fn into_messages(self) -> Vec<Message> {
        match self {
            RetryInput::Messages(messages) => messages,
            RetryInput::Prompt(prompt) => prompt.to_messages(),
        }
    }

    /// 从 JSON 解析输入
    ///
    /// - 数组：每项为消息对象，或 `[role, content]` 二元组
    /// - 对象：`{"system": "...", "messages": [...]}`，视为 Prompt
    /// - 其它：MalformedInput
    pub fn from_json(value: Value) -> Result<Self, RetryError> {
        match value {
            Value::Array(items) => Ok(RetryInput::Messages(parse_messages(items)?)),
            Value::Object(mut map) => {
                let messages = match map.remove("messages") {
                    Some(Value::Array(items)) => parse_messages(items)?,
                    Some(other) => {
                        return Err(RetryError::MalformedInput(format!(
                            "prompt field `messages` must be an array, got {}",
                            type_name(&other)
                        )))
                    }
                    None => {
                        return Err(RetryError::MalformedInput(
                            "prompt object has no `messages` field".to_string(),
                        ))
                    }
                };
                let system = match map.remove("system") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s),
                    Some(other) => {
                        return Err(RetryError::MalformedInput(format!(
                            "prompt field `system` must be a string, got {}",
                            type_name(&other)
                        )))
                    }
                };
                Ok(RetryInput::Prompt(PromptValue { system, messages }))
            }
            other => Err(RetryError::MalformedInput(format!(
                "expected a message list or a prompt object, got {}",
                type_name(&other)
            ))),
        }
    }
}

impl From<Vec<Message>> for RetryInput {
    fn from(messages: Vec<Message>) -> Self {
        RetryInput::Messages(messages)
    }
}

impl From<PromptValue> for RetryInput {
    fn from(prompt: PromptValue) -> Self {
        RetryInput::Prompt(prompt)
    }
}

fn parse_messages(items: Vec<Value>) -> Result<Vec<Message>, RetryError> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| parse_message(i, item))
        .collect()
}

fn parse_message(index: usize, item: Value) -> Result<Message, RetryError> {
    match item {
        Value::Array(pair) => match pair.as_slice() {
            [Value::String(role), Value::String(content)] => {
                let role = parse_role(role).ok_or_else(|| {
                    RetryError::MalformedInput(format!("message {index}: unknown role `{role}`"))
                })?;
                Ok(Message {
                    role,
                    ..Message::user(content.clone())
                })
            }
            _ => Err(RetryError::MalformedInput(format!(
                "message {index}: tuple form must be [role, content]"
            ))),
        },
        obj @ Value::Object(_) => serde_json::from_value(obj)
            .map_err(|e| RetryError::MalformedInput(format!("message {index}: {e}"))),
        other => Err(RetryError::MalformedInput(format!(
            "message {index}: expected an object or [role, content], got {}",
            type_name(&other)
        ))),
    }
}

fn parse_role(role: &str) -> Option<Role> {
    match role {
        "user" | "human" => Some(Role::User),
        "assistant" | "ai" => Some(Role::Assistant),
        "system" => Some(Role::System),
        "tool" => Some(Role::Tool),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_renders_system_first() {
        let prompt = PromptValue::new(vec![Message::user("hi")])
            .with_system("Respond directly by calling the Respond function.");
        let messages = prompt.to_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "hi");
    }

    #[test]
    fn test_from_json_tuple_list() {
        let input = RetryInput::from_json(json!([["user", "hello"], ["ai", "hey"]])).unwrap();
        assert_eq!(input.shape(), InputShape::List);
        let messages = input.into_messages();
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[test]
    fn test_from_json_prompt_object() {
        let input = RetryInput::from_json(json!({
            "system": "be brief",
            "messages": [{"role": "user", "content": "hello"}]
        }))
        .unwrap();
        assert_eq!(input.shape(), InputShape::Prompt);
        assert_eq!(input.into_messages().len(), 2);
    }

    #[test]
    fn test_from_json_rejects_scalars_and_bad_entries() {
        assert!(matches!(
            RetryInput::from_json(json!("hello")),
            Err(RetryError::MalformedInput(_))
        ));
        assert!(matches!(
            RetryInput::from_json(json!({"prompt": "x"})),
            Err(RetryError::MalformedInput(_))
        ));
        assert!(matches!(
            RetryInput::from_json(json!([["wizard", "x"]])),
            Err(RetryError::MalformedInput(_))
        ));
        assert!(matches!(
            RetryInput::from_json(json!([42])),
            Err(RetryError::MalformedInput(_))
        ));
    }
}
