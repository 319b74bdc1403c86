//! JSONPatch：对工具调用参数做增量修正
//!
//! 支持 RFC 6902 的 add / replace / remove 三种操作；一组操作原子生效：
//! 任一操作失败则整组失败，原参数保持不变。

pub mod pointer;

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use pointer::{parse_index, parse_pointer};

/// Patch 操作类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
}

impl PatchOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchOp::Add => "add",
            PatchOp::Remove => "remove",
            PatchOp::Replace => "replace",
        }
    }
}

impl fmt::Display for PatchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A JSON Patch document represents an operation to be performed on a JSON document.
///
/// Note that the op and path are ALWAYS required. Value is required for ALL operations except 'remove'.
/// Examples:
///
/// ```json
/// {"op": "add", "path": "/a/b/c", "value": 1}
/// {"op": "replace", "path": "/a/b/c", "value": 2}
/// {"op": "remove", "path": "/a/b/c"}
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatchOperation {
    /// The operation to be performed. Must be one of 'add', 'remove', 'replace'.
    pub op: PatchOp,
    /// A JSON Pointer path that references a location within the target document where the operation is performed.
    pub path: String,
    /// The value to be used within the operation. REQUIRED for 'add' and 'replace' operations.
    #[serde(default, alias = "patch_value", skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Remove,
            path: path.into(),
            value: None,
        }
    }
}

/// Patch 应用失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    #[error("Invalid JSON pointer: {0:?}")]
    InvalidPointer(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Invalid array index in path: {0}")]
    InvalidIndex(String),

    #[error("Array index out of bounds at {path}: index {index}, length {len}")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("Parent of {0} is neither an object nor an array")]
    NotAContainer(String),

    #[error("Operation '{op}' at {path} requires a value")]
    MissingValue { op: PatchOp, path: String },

    #[error("Cannot remove the document root")]
    RootRemoval,
}

/// 按顺序应用一组 patch，返回新文档；失败时不修改输入
pub fn apply_patch(doc: &Value, patches: &[PatchOperation]) -> Result<Value, PatchError> {
    let mut out = doc.clone();
    for patch in patches {
        apply_one(&mut out, patch)?;
    }
    Ok(out)
}

fn apply_one(doc: &mut Value, patch: &PatchOperation) -> Result<(), PatchError> {
    let tokens = parse_pointer(&patch.path)?;
    match patch.op {
        PatchOp::Add => {
            let value = required_value(patch)?;
            add(doc, &tokens, value, &patch.path)
        }
        PatchOp::Replace => {
            let value = required_value(patch)?;
            let target = resolve_mut(doc, &tokens)
                .ok_or_else(|| PatchError::PathNotFound(patch.path.clone()))?;
            *target = value;
            Ok(())
        }
        PatchOp::Remove => remove(doc, &tokens, &patch.path),
    }
}

fn required_value(patch: &PatchOperation) -> Result<Value, PatchError> {
    patch.value.clone().ok_or_else(|| PatchError::MissingValue {
        op: patch.op,
        path: patch.path.clone(),
    })
}

fn resolve_mut<'a>(mut current: &'a mut Value, tokens: &[String]) -> Option<&'a mut Value> {
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get_mut(token)?,
            Value::Array(items) => items.get_mut(parse_index(token)?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn add(doc: &mut Value, tokens: &[String], value: Value, path: &str) -> Result<(), PatchError> {
    let Some((last, parent_tokens)) = tokens.split_last() else {
        *doc = value;
        return Ok(());
    };
    let parent =
        resolve_mut(doc, parent_tokens).ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    match parent {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            let index = parse_index(last).ok_or_else(|| PatchError::InvalidIndex(path.to_string()))?;
            if index > items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    path: path.to_string(),
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(PatchError::NotAContainer(path.to_string())),
    }
}

fn remove(doc: &mut Value, tokens: &[String], path: &str) -> Result<(), PatchError> {
    let (last, parent_tokens) = tokens.split_last().ok_or(PatchError::RootRemoval)?;
    let parent =
        resolve_mut(doc, parent_tokens).ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    match parent {
        Value::Object(map) => map
            .remove(last)
            .map(|_| ())
            .ok_or_else(|| PatchError::PathNotFound(path.to_string())),
        Value::Array(items) => {
            let index = parse_index(last).ok_or_else(|| PatchError::InvalidIndex(path.to_string()))?;
            if index >= items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    path: path.to_string(),
                    index,
                    len: items.len(),
                });
            }
            items.remove(index);
            Ok(())
        }
        _ => Err(PatchError::NotAContainer(path.to_string())),
    }
}
