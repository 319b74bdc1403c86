//! 工具注册表
//!
//! 每个工具由 ToolSpec 描述（name / description / 参数 JSON Schema），
//! ToolRegistry 按名注册与查找，供 Oracle 绑定与 Validator 编译 Schema 使用。

use schemars::{schema_for, JsonSchema};
use serde::Serialize;
use serde_json::Value;

use crate::core::ToolError;

/// 工具声明：名称、描述（供 LLM 理解）、参数 JSON Schema
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// 由 schemars 从 Rust 类型生成参数 Schema，名称与描述取自类型名与文档注释
    pub fn of<T: JsonSchema>() -> Self {
        let root = schema_for!(T);
        let (title, description) = root
            .schema
            .metadata
            .as_ref()
            .map(|m| (m.title.clone(), m.description.clone()))
            .unwrap_or_default();
        let name = title.unwrap_or_else(T::schema_name);
        let parameters = serde_json::to_value(&root).unwrap_or_else(|_| empty_object_schema());
        Self {
            name,
            description: description.unwrap_or_default(),
            parameters,
        }
    }

    /// 指定名称与描述，参数 Schema 由类型生成
    pub fn from_type<T: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Self::of::<T>().parameters,
        }
    }
}

fn empty_object_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

/// 工具注册表：保持注册顺序，按名称查找
#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolSpec>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 批量注册；名称重复时报错
    pub fn from_specs(specs: impl IntoIterator<Item = ToolSpec>) -> Result<Self, ToolError> {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, spec: ToolSpec) -> Result<(), ToolError> {
        if self.get(&spec.name).is_some() {
            return Err(ToolError::DuplicateTool(spec.name));
        }
        self.tools.push(spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 生成工具 schema JSON（名称、描述、参数），可拼入 system prompt
    pub fn to_schema_json(&self) -> String {
        serde_json::to_string_pretty(&self.tools).unwrap_or_else(|_| "[]".to_string())
    }
}
