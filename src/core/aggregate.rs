//! 聚合：把本次调用各次尝试生成的消息归并为一条返回消息

use crate::core::AggregateError;
use crate::message::Message;
use crate::observability::RetryObserver;

/// 聚合器：输入为生成窗口（不含调用方历史）
pub trait Aggregator: Send + Sync {
    fn aggregate(
        &self,
        generated: &[Message],
        observer: &dyn RetryObserver,
    ) -> Result<Message, AggregateError>;

    /// 聚合失败时写回对话的说明，供下一次生成参考
    fn describe_error(&self, err: &AggregateError) -> String {
        format!("Error: {err}\n\nRespond after fixing all validation errors.")
    }
}

impl<F> Aggregator for F
where
    F: Fn(&[Message]) -> Result<Message, AggregateError> + Send + Sync,
{
    fn aggregate(
        &self,
        generated: &[Message],
        _observer: &dyn RetryObserver,
    ) -> Result<Message, AggregateError> {
        self(generated)
    }
}

/// 默认聚合：取窗口内最后一条 assistant 消息，丢弃之前失败的尝试
#[derive(Debug, Default, Clone, Copy)]
pub struct LastAssistant;

impl Aggregator for LastAssistant {
    fn aggregate(
        &self,
        generated: &[Message],
        _observer: &dyn RetryObserver,
    ) -> Result<Message, AggregateError> {
        generated
            .iter()
            .rev()
            .find(|m| m.is_assistant())
            .cloned()
            .ok_or(AggregateError::NoAssistantMessage)
    }
}
