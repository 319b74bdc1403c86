//! JSONPatch 修正策略
//!
//! primary 绑定业务工具；fallback 只绑定 PatchFunctionParameters，针对失败调用产出 RFC 6902 操作。
//! PatchAggregator 按顺序重放生成窗口：普通调用按 id 收集，修正调用把 Patch 应用到目标调用上，
//! 并让目标调用改用修正调用的 id（原 id 仍可被后续修正引用）。

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::core::{AggregateError, Aggregator, RetryOrchestrator, ToolError};
use crate::llm::ChatModel;
use crate::message::{CallKind, Message, ToolCall};
use crate::observability::{RetryEvent, RetryObserver};
use crate::patch::apply_patch;
use crate::strategy::BindOptions;
use crate::tools::{correction_tool, PatchFunctionParameters, ToolSpec, ValidationFailure};

pub const STRATEGY_NAME: &str = "jsonpatch";

/// 绑定工具集；修正时由只绑定修正工具的 fallback 产出 JSONPatch
pub fn bind_with_patches(
    model: &dyn ChatModel,
    tools: Vec<ToolSpec>,
    options: BindOptions,
) -> Result<RetryOrchestrator, ToolError> {
    let oracle = model.bind_tools(&tools, options.tool_choice.as_deref());
    let fallback = model.bind_tools(&[correction_tool()], None);

    let mut validated = tools;
    validated.push(correction_tool());
    let validator = options.validator(validated)?.with_formatter(format_patch_error);

    let config = options
        .retry_config()
        .with_fallback(fallback)
        .with_aggregator(PatchAggregator);
    Ok(RetryOrchestrator::new(oracle, Arc::new(validator), config)
        .with_observer(options.observer())
        .with_strategy_name(STRATEGY_NAME))
}

/// 校验失败时的错误说明：错误、当前参数、期望 Schema，并要求针对该调用给出 JSONPatch
pub fn format_patch_error(failure: &ValidationFailure, call: &ToolCall, schema: &Value) -> String {
    let pretty = |v: &Value| serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string());
    format!(
        "Error:\n\n```\n{}\n```\n\nCurrent Arguments:\n\n```json\n{}\n```\n\nExpected Parameter Schema:\n\n```json\n{}\n```\n\nPlease respond with a JSONPatch to correct the error for tool_call_id=[{}].",
        failure.errors.join("\n"),
        pretty(&call.args),
        pretty(schema),
        call.id
    )
}

/// 重放窗口过程中的已解析调用
#[derive(Default)]
struct Resolved {
    calls: Vec<ToolCall>,
    /// 原始 id 与修正后 id 均指向 calls 中的位置
    index: HashMap<String, usize>,
}

impl Resolved {
    fn insert(&mut self, call: &ToolCall) {
        match self.index.get(&call.id) {
            Some(&pos) => self.calls[pos] = call.clone(),
            None => {
                self.index.insert(call.id.clone(), self.calls.len());
                self.calls.push(call.clone());
            }
        }
    }

    fn correct(&mut self, correction: &ToolCall, observer: &dyn RetryObserver) -> Result<(), AggregateError> {
        let params: PatchFunctionParameters = serde_json::from_value(correction.args.clone())
            .map_err(|e| AggregateError::MalformedCorrection {
                call_id: correction.id.clone(),
                reason: e.to_string(),
            })?;

        let pos = match self.index.get(&params.target_call_id) {
            Some(&pos) => pos,
            None => {
                let Some(oldest) = self.calls.first() else {
                    return Err(AggregateError::NothingToPatch {
                        call_id: correction.id.clone(),
                    });
                };
                observer.on_event(&RetryEvent::UnresolvedReference {
                    requested: params.target_call_id.clone(),
                    resolved: oldest.id.clone(),
                    known: self.calls.iter().map(|c| c.id.clone()).collect(),
                });
                0
            }
        };

        let target = &mut self.calls[pos];
        let args = apply_patch(&target.args, &params.patches).map_err(|source| AggregateError::Patch {
            call_id: correction.id.clone(),
            target_id: target.id.clone(),
            source,
        })?;
        target.args = args;
        target.id = correction.id.clone();
        self.index.insert(correction.id.clone(), pos);
        Ok(())
    }
}

/// Patch 聚合器：把修正调用折叠进被修正的原调用
#[derive(Debug, Default, Clone, Copy)]
pub struct PatchAggregator;

impl Aggregator for PatchAggregator {
    fn aggregate(
        &self,
        generated: &[Message],
        observer: &dyn RetryObserver,
    ) -> Result<Message, AggregateError> {
        let latest = generated
            .iter()
            .rposition(Message::is_assistant)
            .ok_or(AggregateError::NoAssistantMessage)?;

        let mut resolved = Resolved::default();
        let mut content = String::new();
        for (pos, message) in generated.iter().enumerate() {
            if !message.is_assistant() {
                continue;
            }
            if content.is_empty() && !message.content.is_empty() {
                content = message.content.clone();
            }
            for call in &message.tool_calls {
                match call.kind() {
                    CallKind::Ordinary => resolved.insert(call),
                    CallKind::Correction => match resolved.correct(call, observer) {
                        Ok(()) => {}
                        // 早先被拒绝的修正已经写回过错误，重放时跳过
                        Err(err) if pos < latest => {
                            tracing::debug!(call_id = %call.id, error = %err, "skipping rejected correction");
                        }
                        Err(err) => return Err(err),
                    },
                }
            }
        }

        Ok(Message::assistant_with_calls(content, resolved.calls))
    }

    fn describe_error(&self, err: &AggregateError) -> String {
        format!(
            "Error:\n\n```\n{err}\n```\n\nThe patches were not applied. Please respond with a JSONPatch that applies cleanly to the current arguments of the tool call."
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RetryError;
    use crate::llm::{MockChatModel, ScriptedOracle};
    use crate::observability::{NoopObserver, RecordingObserver};
    use crate::patch::PatchOperation;
    use crate::tools::PATCH_TOOL_NAME;
    use serde_json::json;

    fn respond_spec() -> ToolSpec {
        ToolSpec::new(
            "Respond",
            "Use to generate the response.",
            json!({
                "type": "object",
                "properties": {"reason": {"type": "string"}, "answer": {"type": "string"}},
                "required": ["reason", "answer"]
            }),
        )
    }

    fn patch_call(id: &str, target: &str, patches: Vec<PatchOperation>) -> ToolCall {
        ToolCall::with_id(
            id,
            PATCH_TOOL_NAME,
            json!({
                "target_call_id": target,
                "justification": "fix the answer",
                "patches": patches,
            }),
        )
    }

    #[test]
    fn test_patch_folds_into_original_and_adopts_correction_id() {
        let window = vec![
            Message::assistant_with_calls(
                "thinking",
                vec![ToolCall::with_id("c1", "Respond", json!({"reason": "r"}))],
            ),
            Message::tool_error("c1", "missing answer"),
            Message::assistant_with_calls(
                "",
                vec![patch_call("p1", "c1", vec![PatchOperation::add("/answer", json!("42"))])],
            ),
        ];
        let out = PatchAggregator.aggregate(&window, &NoopObserver).unwrap();

        assert_eq!(out.content, "thinking");
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].id, "p1");
        assert_eq!(out.tool_calls[0].name, "Respond");
        assert_eq!(out.tool_calls[0].args, json!({"reason": "r", "answer": "42"}));
    }

    #[test]
    fn test_corrected_id_can_be_patched_again() {
        let window = vec![
            Message::assistant_with_calls("", vec![ToolCall::with_id("c1", "Respond", json!({}))]),
            Message::assistant_with_calls(
                "",
                vec![patch_call("p1", "c1", vec![PatchOperation::add("/reason", json!("r"))])],
            ),
            Message::assistant_with_calls(
                "",
                vec![patch_call("p2", "p1", vec![PatchOperation::add("/answer", json!("a"))])],
            ),
        ];
        let out = PatchAggregator.aggregate(&window, &NoopObserver).unwrap();
        assert_eq!(out.tool_calls[0].id, "p2");
        assert_eq!(out.tool_calls[0].args, json!({"reason": "r", "answer": "a"}));
    }

    #[test]
    fn test_unknown_target_falls_back_to_oldest_call() {
        let window = vec![
            Message::assistant_with_calls(
                "",
                vec![
                    ToolCall::with_id("c1", "Respond", json!({"reason": "r"})),
                    ToolCall::with_id("c2", "Respond", json!({"reason": "s", "answer": "b"})),
                ],
            ),
            Message::assistant_with_calls(
                "",
                vec![patch_call("p1", "nope", vec![PatchOperation::add("/answer", json!("a"))])],
            ),
        ];
        let observer = RecordingObserver::new();
        let out = PatchAggregator.aggregate(&window, &observer).unwrap();

        assert_eq!(out.tool_calls[0].id, "p1");
        assert_eq!(out.tool_calls[0].args["answer"], json!("a"));
        assert_eq!(out.tool_calls[1].id, "c2");
        assert_eq!(
            observer.events(),
            vec![RetryEvent::UnresolvedReference {
                requested: "nope".to_string(),
                resolved: "c1".to_string(),
                known: vec!["c1".to_string(), "c2".to_string()],
            }]
        );
    }

    #[test]
    fn test_failed_patch_in_latest_message_is_reported() {
        let window = vec![
            Message::assistant_with_calls("", vec![ToolCall::with_id("c1", "Respond", json!({}))]),
            Message::assistant_with_calls(
                "",
                vec![patch_call("p1", "c1", vec![PatchOperation::remove("/missing")])],
            ),
        ];
        let err = PatchAggregator.aggregate(&window, &NoopObserver).unwrap_err();
        assert_eq!(err.call_id(), Some("p1"));
        assert!(matches!(err, AggregateError::Patch { ref target_id, .. } if target_id == "c1"));
    }

    #[test]
    fn test_rejected_correction_is_skipped_on_replay() {
        let window = vec![
            Message::assistant_with_calls("", vec![ToolCall::with_id("c1", "Respond", json!({}))]),
            Message::assistant_with_calls(
                "",
                vec![patch_call("p1", "c1", vec![PatchOperation::remove("/missing")])],
            ),
            Message::tool_error("p1", "patch rejected"),
            Message::assistant_with_calls(
                "",
                vec![patch_call(
                    "p2",
                    "c1",
                    vec![
                        PatchOperation::add("/reason", json!("r")),
                        PatchOperation::add("/answer", json!("a")),
                    ],
                )],
            ),
        ];
        let out = PatchAggregator.aggregate(&window, &NoopObserver).unwrap();
        assert_eq!(out.tool_calls[0].id, "p2");
        assert_eq!(out.tool_calls[0].args, json!({"reason": "r", "answer": "a"}));
    }

    #[test]
    fn test_malformed_correction_args() {
        let window = vec![
            Message::assistant_with_calls("", vec![ToolCall::with_id("c1", "Respond", json!({}))]),
            Message::assistant_with_calls(
                "",
                vec![ToolCall::with_id("p1", PATCH_TOOL_NAME, json!({"patches": "nope"}))],
            ),
        ];
        let err = PatchAggregator.aggregate(&window, &NoopObserver).unwrap_err();
        assert!(matches!(err, AggregateError::MalformedCorrection { .. }));
    }

    #[test]
    fn test_correction_without_pending_call() {
        let window = vec![Message::assistant_with_calls(
            "",
            vec![patch_call("p1", "c1", vec![PatchOperation::add("/a", json!(1))])],
        )];
        let err = PatchAggregator.aggregate(&window, &NoopObserver).unwrap_err();
        assert_eq!(err, AggregateError::NothingToPatch { call_id: "p1".to_string() });
    }

    #[test]
    fn test_patch_error_text_names_call_and_schema() {
        let failure = ValidationFailure {
            call_id: "c1".to_string(),
            tool_name: "Respond".to_string(),
            errors: vec!["\"answer\" is a required property".to_string()],
        };
        let call = ToolCall::with_id("c1", "Respond", json!({"reason": "r"}));
        let text = format_patch_error(&failure, &call, &respond_spec().parameters);
        assert!(text.contains("Current Arguments"));
        assert!(text.contains("Expected Parameter Schema"));
        assert!(text.ends_with("tool_call_id=[c1]."));
    }

    #[tokio::test]
    async fn test_failed_patch_consumes_attempt_then_recovers() {
        let primary = Arc::new(ScriptedOracle::always(Message::assistant_with_calls(
            "",
            vec![ToolCall::with_id("c1", "Respond", json!({"reason": "r"}))],
        )));
        let fixer = Arc::new(ScriptedOracle::new(vec![
            Message::assistant_with_calls(
                "",
                vec![patch_call("p1", "c1", vec![PatchOperation::replace("/answer", json!("a"))])],
            ),
            Message::assistant_with_calls(
                "",
                vec![patch_call("p2", "c1", vec![PatchOperation::add("/answer", json!("a"))])],
            ),
        ]));
        let model = MockChatModel::new(primary.clone()).route(PATCH_TOOL_NAME, fixer.clone());

        let engine = bind_with_patches(&model, vec![respond_spec()], BindOptions::new(3)).unwrap();
        let out = engine.run(vec![Message::user("hi")]).await.unwrap();

        assert_eq!(primary.calls(), 1);
        assert_eq!(fixer.calls(), 2);
        assert_eq!(out.tool_calls[0].id, "p2");
        assert_eq!(out.tool_calls[0].args, json!({"reason": "r", "answer": "a"}));

        // 第二次修正看到拒绝说明
        let second = &fixer.inputs()[1];
        let rejected = second.last().unwrap();
        assert!(rejected.is_error);
        assert_eq!(rejected.tool_call_id.as_deref(), Some("p1"));
        assert!(rejected.content.contains("The patches were not applied"));
    }

    #[tokio::test]
    async fn test_patch_strategy_exhausts() {
        let primary = Arc::new(ScriptedOracle::always(Message::assistant_with_calls(
            "",
            vec![ToolCall::with_id("c1", "Respond", json!({}))],
        )));
        let fixer = Arc::new(ScriptedOracle::always(Message::assistant_with_calls(
            "",
            vec![patch_call("p1", "c1", vec![PatchOperation::add("/reason", json!("r"))])],
        )));
        let model = MockChatModel::new(primary).route(PATCH_TOOL_NAME, fixer.clone());

        let engine = bind_with_patches(&model, vec![respond_spec()], BindOptions::new(2)).unwrap();
        let err = engine.run(vec![Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, RetryError::AttemptsExhausted { max_attempts: 2, attempts: 2 }));
        assert_eq!(fixer.calls(), 1);
    }
}
