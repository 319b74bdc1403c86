//! 工具相关 Schema：JSONPatch 修正工具参数、文本工具调用格式（schemars 自动生成）

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::patch::PatchOperation;
use crate::tools::ToolSpec;

/// 修正工具名（fallback Oracle 只绑定此工具）
pub const PATCH_TOOL_NAME: &str = "PatchFunctionParameters";

/// Respond with all JSONPatch operation to correct validation errors caused by passing in incorrect or incomplete parameters in a previous tool call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatchFunctionParameters {
    /// The ID of the original tool call that generated the error. Must NOT be an ID of a PatchFunctionParameters tool call.
    #[serde(alias = "tool_call_id")]
    pub target_call_id: String,
    /// Think step-by-step, listing each validation error and the JSONPatch operation needed to correct it. Cite the fields in the JSONSchema you referenced in developing this plan.
    #[serde(default, alias = "reasoning")]
    pub justification: String,
    /// A list of JSONPatch operations to be applied to the previous tool call's response.
    pub patches: Vec<PatchOperation>,
}

/// 修正工具声明
pub fn correction_tool() -> ToolSpec {
    let spec = ToolSpec::of::<PatchFunctionParameters>();
    ToolSpec {
        name: PATCH_TOOL_NAME.to_string(),
        ..spec
    }
}

/// 文本模式下的工具调用格式：`{"tool": "...", "args": {...}}`（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，必须是已绑定的工具之一
    pub tool: String,
    /// 工具参数，须符合该工具的参数 Schema
    pub args: HashMap<String, serde_json::Value>,
}

/// 返回文本工具调用格式的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
