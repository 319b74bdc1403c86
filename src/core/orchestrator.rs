//! 重试编排器：Generate -> Validate -> {Done | Correct}，Correct -> Validate 循环
//!
//! 每一步严格等待上一步的 Oracle / Validator 调用完成；可恢复错误写回消息窗口，
//! 只有尝试次数耗尽与非法输入（以及协作方自身故障）会越过编排边界。

use std::sync::Arc;

use serde_json::Value;

use crate::core::{AggregateError, FallbackContext, RetryConfig, RetryError, RetryState};
use crate::llm::Oracle;
use crate::message::{InputShape, Message, RetryInput};
use crate::observability::{NoopObserver, RetryEvent, RetryObserver};
use crate::tools::Validator;

/// 状态机步骤（封闭集合）
#[derive(Debug)]
enum Step {
    Generate,
    Validate,
    Correct,
    /// 携带已通过校验的聚合结果
    Done(Message),
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Generate => "generate",
            Step::Validate => "validate",
            Step::Correct => "correct",
            Step::Done(_) => "done",
        }
    }
}

/// 一次编排调用的完整结果
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    /// 最终消息（聚合结果，或未使用工具时的原始回复）
    pub message: Message,
    /// 生成调用次数（primary + fallback）
    pub attempts: usize,
    pub input_shape: InputShape,
    /// 调用方历史 + 最终消息
    pub history: Vec<Message>,
}

/// 校验-重试编排器
pub struct RetryOrchestrator {
    oracle: Arc<dyn Oracle>,
    validator: Arc<dyn Validator>,
    config: RetryConfig,
    observer: Arc<dyn RetryObserver>,
    strategy: &'static str,
}

impl RetryOrchestrator {
    pub fn new(oracle: Arc<dyn Oracle>, validator: Arc<dyn Validator>, config: RetryConfig) -> Self {
        Self {
            oracle,
            validator,
            config,
            observer: Arc::new(NoopObserver),
            strategy: "custom",
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// 策略标签（"default" / "jsonpatch" 等），仅用于诊断
    pub fn with_strategy_name(mut self, name: &'static str) -> Self {
        self.strategy = name;
        self
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// 执行一次编排，返回最终消息
    pub async fn run(&self, input: impl Into<RetryInput>) -> Result<Message, RetryError> {
        self.run_detailed(input).await.map(|outcome| outcome.message)
    }

    /// 以 JSON 形式传入输入（消息数组或 Prompt 对象），非法时在调用 Oracle 前报 MalformedInput
    pub async fn run_json(&self, input: Value) -> Result<Message, RetryError> {
        let input = RetryInput::from_json(input)?;
        self.run(input).await
    }

    pub async fn run_detailed(&self, input: impl Into<RetryInput>) -> Result<RetryOutcome, RetryError> {
        let input = input.into();
        let shape = input.shape();
        let mut state = RetryState::new(input.into_messages(), shape);
        let mut step = Step::Generate;

        loop {
            tracing::debug!(
                strategy = self.strategy,
                step = step.name(),
                attempt = state.attempt_number(),
                "retry step"
            );
            step = match step {
                Step::Generate => {
                    let candidate = self
                        .oracle
                        .invoke(state.messages())
                        .await
                        .map_err(RetryError::Oracle)?;
                    let latest = self.record_candidate(&mut state, candidate);
                    if latest.has_tool_calls() || self.config.tool_choice.is_some() {
                        Step::Validate
                    } else {
                        // 未使用工具：原样返回，不做聚合
                        return Ok(self.finish(state, latest));
                    }
                }
                Step::Validate => self.validate(&mut state).await?,
                Step::Correct => {
                    self.correct(&mut state).await?;
                    Step::Validate
                }
                Step::Done(aggregated) => {
                    let message = state.finalize(aggregated);
                    return Ok(self.finish(state, message));
                }
            };
        }
    }

    fn record_candidate(&self, state: &mut RetryState, candidate: Message) -> Message {
        let latest = state.push_candidate(candidate).clone();
        self.observer.on_event(&RetryEvent::Generated {
            attempt: state.attempt_number(),
            tool_calls: latest.tool_calls.len(),
        });
        latest
    }

    fn finish(&self, state: RetryState, message: Message) -> RetryOutcome {
        let attempts = state.attempt_number();
        self.observer.on_event(&RetryEvent::Finalized { attempts });
        RetryOutcome {
            message,
            attempts,
            input_shape: state.input_shape(),
            history: state.into_messages(),
        }
    }

    async fn validate(&self, state: &mut RetryState) -> Result<Step, RetryError> {
        let attempt = state.attempt_number();
        let candidate = match self
            .config
            .aggregate
            .aggregate(state.generated(), self.observer.as_ref())
        {
            Ok(candidate) => candidate,
            Err(err) => {
                self.reject_aggregation(state, &err);
                return Ok(Step::Correct);
            }
        };

        if candidate.tool_calls.is_empty() {
            if let Some(choice) = &self.config.tool_choice {
                let text = format!(
                    "ValidationError: please respond with a valid tool call [tool_choice={choice}]."
                );
                self.observer.on_event(&RetryEvent::ValidationFailed {
                    attempt,
                    errors: vec![text.clone()],
                });
                state.push(Message::user(text).into_error());
                return Ok(Step::Correct);
            }
        }

        let feedback = self
            .validator
            .check(&candidate.tool_calls)
            .await
            .map_err(RetryError::Validator)?;
        let errors: Vec<String> = feedback
            .iter()
            .filter(|m| m.is_error)
            .map(|m| m.content.clone())
            .collect();
        for message in feedback {
            state.push(message);
        }

        if state.needs_correction() {
            self.observer
                .on_event(&RetryEvent::ValidationFailed { attempt, errors });
            Ok(Step::Correct)
        } else {
            Ok(Step::Done(candidate))
        }
    }

    /// 聚合失败（如 Patch 无法应用）转为校验错误消息
    fn reject_aggregation(&self, state: &mut RetryState, err: &AggregateError) {
        let text = self.config.aggregate.describe_error(err);
        let message = match err.call_id() {
            Some(call_id) => {
                self.observer.on_event(&RetryEvent::PatchRejected {
                    call_id: call_id.to_string(),
                    reason: err.to_string(),
                });
                Message::tool_error(call_id, text.clone())
            }
            None => Message::user(text.clone()).into_error(),
        };
        self.observer.on_event(&RetryEvent::ValidationFailed {
            attempt: state.attempt_number(),
            errors: vec![text],
        });
        state.push(message);
    }

    async fn correct(&self, state: &mut RetryState) -> Result<(), RetryError> {
        let max_attempts = self.config.max_attempts;
        let attempts = state.attempt_number();
        if attempts >= max_attempts {
            self.observer.on_event(&RetryEvent::Exhausted {
                attempts,
                max_attempts,
            });
            return Err(RetryError::AttemptsExhausted {
                max_attempts,
                attempts,
            });
        }
        self.observer.on_event(&RetryEvent::Correcting {
            attempt: attempts + 1,
            max_attempts,
        });

        let oracle = self.config.fallback.as_ref().unwrap_or(&self.oracle);
        let context = match self.config.fallback_context {
            FallbackContext::Window => state.generated(),
            FallbackContext::FullHistory => state.messages(),
        };
        let candidate = oracle.invoke(context).await.map_err(RetryError::Oracle)?;
        self.record_candidate(state, candidate);
        Ok(())
    }
}
