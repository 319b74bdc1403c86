//! 工具层：工具声明与注册、Schema 生成、参数校验

pub mod registry;
pub mod schema;
pub mod validator;

pub use registry::{ToolRegistry, ToolSpec};
pub use schema::{correction_tool, tool_call_schema_json, PatchFunctionParameters, PATCH_TOOL_NAME};
pub use validator::{
    default_format_error, ErrorFormatter, SchemaValidator, SemanticCheck, ValidationFailure, Validator,
};
