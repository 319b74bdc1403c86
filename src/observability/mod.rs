//! 可观测性
//!
//! 编排核心默认静默：所有诊断通过 RetryObserver 钩子发出；TracingObserver 将事件转为 tracing 日志。

use std::sync::Mutex;

use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化 tracing（EnvFilter 默认 info）；重复调用时忽略
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// 编排过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetryEvent {
    /// Oracle 产出一条候选消息
    Generated { attempt: usize, tool_calls: usize },
    /// 校验未通过
    ValidationFailed { attempt: usize, errors: Vec<String> },
    /// 进入修正步骤（即将进行第 attempt 次生成）
    Correcting { attempt: usize, max_attempts: usize },
    /// 修正调用引用了不存在的 tool call id，已回退到最早的待修正调用
    UnresolvedReference {
        requested: String,
        resolved: String,
        known: Vec<String>,
    },
    /// Patch 应用失败，转为校验错误
    PatchRejected { call_id: String, reason: String },
    /// 成功结束
    Finalized { attempts: usize },
    /// 尝试次数耗尽
    Exhausted { attempts: usize, max_attempts: usize },
}

/// 观察者钩子
pub trait RetryObserver: Send + Sync {
    fn on_event(&self, event: &RetryEvent);
}

/// 默认：不输出任何内容
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RetryObserver for NoopObserver {
    fn on_event(&self, _event: &RetryEvent) {}
}

/// 将事件写入 tracing：降级路径用 warn，其余 debug
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RetryObserver for TracingObserver {
    fn on_event(&self, event: &RetryEvent) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        match event {
            RetryEvent::UnresolvedReference { requested, resolved, .. } => {
                tracing::warn!(requested = %requested, resolved = %resolved, event = %payload, "retry")
            }
            RetryEvent::Exhausted { attempts, max_attempts } => {
                tracing::warn!(attempts, max_attempts, event = %payload, "retry")
            }
            _ => tracing::debug!(event = %payload, "retry"),
        }
    }
}

/// 记录所有事件，便于测试断言
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RetryEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RetryEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl RetryObserver for RecordingObserver {
    fn on_event(&self, event: &RetryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = RetryEvent::Correcting {
            attempt: 2,
            max_attempts: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "correcting");
        assert_eq!(json["attempt"], 2);
    }

    #[test]
    fn test_recording_observer_keeps_order() {
        let observer = RecordingObserver::new();
        observer.on_event(&RetryEvent::Generated { attempt: 1, tool_calls: 1 });
        observer.on_event(&RetryEvent::Finalized { attempts: 1 });
        let events = observer.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], RetryEvent::Finalized { attempts: 1 }));
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init();
        init();
        TracingObserver.on_event(&RetryEvent::Exhausted { attempts: 1, max_attempts: 1 });
    }
}
