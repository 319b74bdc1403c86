//! 单次编排调用的状态
//!
//! messages 只追加；唯一例外是 finalize：把本次调用生成的后缀整体替换为一条聚合消息。
//! initial_message_count 在开始时记录一次，用于区分调用方历史与本次生成的消息。

use crate::message::{InputShape, Message, Role};

/// 编排状态（随调用创建，随返回丢弃）
#[derive(Debug, Clone)]
pub struct RetryState {
    messages: Vec<Message>,
    attempt_number: usize,
    initial_message_count: usize,
    input_shape: InputShape,
}

impl RetryState {
    pub fn new(history: Vec<Message>, input_shape: InputShape) -> Self {
        let initial_message_count = history.len();
        Self {
            messages: history,
            attempt_number: 0,
            initial_message_count,
            input_shape,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 本次调用生成的消息窗口
    pub fn generated(&self) -> &[Message] {
        &self.messages[self.initial_message_count..]
    }

    pub fn attempt_number(&self) -> usize {
        self.attempt_number
    }

    pub fn initial_message_count(&self) -> usize {
        self.initial_message_count
    }

    pub fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    /// 记录一次 Oracle 生成的候选消息，attempt_number 加 1
    pub fn push_candidate(&mut self, message: Message) -> &Message {
        self.attempt_number += 1;
        self.push(message)
    }

    /// 追加非生成类消息（校验错误等），不计入尝试次数
    pub fn push(&mut self, mut message: Message) -> &Message {
        message.assign_ids();
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    /// 由新到旧扫描生成窗口，遇到第一条 assistant 消息为止；窗口内有错误标记则需修正
    pub fn needs_correction(&self) -> bool {
        for m in self.generated().iter().rev() {
            if m.role == Role::Assistant {
                break;
            }
            if m.is_error {
                return true;
            }
        }
        false
    }

    /// 以聚合结果原子替换生成窗口，返回最终消息
    pub fn finalize(&mut self, mut aggregated: Message) -> Message {
        aggregated.assign_ids();
        self.messages.truncate(self.initial_message_count);
        self.messages.push(aggregated.clone());
        aggregated
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
