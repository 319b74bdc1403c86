//! 核心编排层：错误类型、编排状态、聚合、重试配置、状态机

pub mod aggregate;
pub mod error;
pub mod orchestrator;
pub mod retry_config;
pub mod state;

pub use aggregate::{Aggregator, LastAssistant};
pub use error::{AggregateError, RetryError, ToolError};
pub use orchestrator::{RetryOrchestrator, RetryOutcome};
pub use retry_config::{FallbackContext, RetryConfig};
pub use state::RetryState;
