use std::sync::Arc;
use std::time::Duration;

use crate::errors::{PointClawError, PointClawResult};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage};
use crate::memory::store::MemoryDigest;
use crate::perception::grid::GridMapping;
use crate::perception::som_grid::build_grid_prompt;
use crate::perception::types::CaptureFrame;
use crate::planner::parse::parse_action_plan;
use crate::planner::prompt::{build_planner_prompt, estimate_tokens, PLANNER_SYSTEM_PROMPT};
use crate::planner::types::ActionPlan;

/// What came back from one planner request. `raw` is kept even when the
/// plan failed validation so the session log shows what the model said.
#[derive(Debug)]
pub struct PlannerReply {
    pub raw: Option<String>,
    pub plan: PointClawResult<ActionPlan>,
}

/// Sends the annotated frame plus memory to the vision model and validates the answer.
pub struct ActionPlanner {
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
    instructions: String,
    timeout: Duration,
}

impl ActionPlanner {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        call: CallConfig,
        instructions: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            call,
            instructions: instructions.into(),
            timeout,
        }
    }

    /// `provider/model` label.
    pub fn model_label(&self) -> String {
        format!("{}/{}", self.provider.name(), self.call.model)
    }

    /// One model round trip. Never panics on bad output: timeouts, transport
    /// errors and invalid JSON all come back as `MalformedResponse`.
    pub async fn request(&self, frame: &CaptureFrame, mapping: &GridMapping, memory: &MemoryDigest) -> PlannerReply {
        let prompt = build_planner_prompt(&build_grid_prompt(mapping), &self.instructions, memory);
        tracing::info!(
            model = %self.call.model,
            image = %format!("{}x{}", frame.width, frame.height),
            est_tokens = estimate_tokens(&prompt, frame.annotated_base64.len()),
            "requesting action plan"
        );

        let messages = vec![
            ChatMessage::system(PLANNER_SYSTEM_PROMPT),
            ChatMessage::user_with_png(&frame.annotated_base64, prompt),
        ];

        let response = match tokio::time::timeout(self.timeout, self.provider.chat(messages, &self.call)).await {
            Err(_) => {
                return PlannerReply {
                    raw: None,
                    plan: Err(PointClawError::MalformedResponse(format!(
                        "model did not answer within {}s",
                        self.timeout.as_secs()
                    ))),
                }
            }
            Ok(Err(e)) => {
                return PlannerReply {
                    raw: None,
                    plan: Err(PointClawError::MalformedResponse(format!("model call failed: {e}"))),
                }
            }
            Ok(Ok(response)) => response,
        };

        if !response.reasoning.is_empty() {
            tracing::debug!(len = response.reasoning.len(), "model reasoning received");
        }
        let plan = parse_action_plan(&response.content);
        if let Ok(plan) = &plan {
            tracing::info!(clicks = plan.clicks.len(), plan = %plan.plan, "action plan parsed");
        }
        PlannerReply {
            raw: Some(response.content),
            plan,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::llm::types::LlmResponse;
    use crate::perception::types::{CropMargins, WindowRect};

    struct Fixed(&'static str);

    #[async_trait]
    impl LlmProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn list_models(&self) -> PointClawResult<Vec<String>> {
            Ok(vec!["m".into()])
        }

        async fn chat(&self, messages: Vec<ChatMessage>, _cfg: &CallConfig) -> PointClawResult<LlmResponse> {
            assert_eq!(messages.len(), 2);
            Ok(LlmResponse {
                content: self.0.into(),
                reasoning: String::new(),
            })
        }
    }

    struct Slow;

    #[async_trait]
    impl LlmProvider for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn list_models(&self) -> PointClawResult<Vec<String>> {
            Ok(vec![])
        }

        async fn chat(&self, _messages: Vec<ChatMessage>, _cfg: &CallConfig) -> PointClawResult<LlmResponse> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(LlmResponse::default())
        }
    }

    fn call() -> CallConfig {
        CallConfig {
            model: "m".into(),
            stream: false,
            temperature: 0.1,
            max_tokens: 256,
        }
    }

    fn frame() -> CaptureFrame {
        CaptureFrame {
            raw_png: vec![],
            annotated_png: vec![],
            annotated_base64: "QUJD".into(),
            width: 800,
            height: 600,
            captured_at: chrono::Utc::now(),
        }
    }

    fn mapping() -> GridMapping {
        GridMapping::new(WindowRect::new(0, 0, 800, 600), CropMargins::default(), 10, 8).unwrap()
    }

    #[tokio::test]
    async fn test_valid_reply_parsed() {
        let planner = ActionPlanner::new(
            Arc::new(Fixed(r#"{"description":"d","plan":"p","clicks":[{"cell":1}]}"#)),
            call(),
            "",
            Duration::from_secs(5),
        );
        let reply = planner.request(&frame(), &mapping(), &MemoryDigest::default()).await;
        assert!(reply.raw.is_some());
        assert_eq!(reply.plan.unwrap().clicks.len(), 1);
        assert_eq!(planner.model_label(), "fixed/m");
    }

    #[tokio::test]
    async fn test_missing_clicks_keeps_raw_text() {
        let planner = ActionPlanner::new(
            Arc::new(Fixed(r#"{"description":"d","plan":"p"}"#)),
            call(),
            "",
            Duration::from_secs(5),
        );
        let reply = planner.request(&frame(), &mapping(), &MemoryDigest::default()).await;
        assert!(matches!(reply.plan, Err(PointClawError::MalformedResponse(_))));
        assert_eq!(reply.raw.as_deref(), Some(r#"{"description":"d","plan":"p"}"#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_malformed_response() {
        let planner = ActionPlanner::new(Arc::new(Slow), call(), "", Duration::from_secs(60));
        let reply = planner.request(&frame(), &mapping(), &MemoryDigest::default()).await;
        assert!(matches!(reply.plan, Err(PointClawError::MalformedResponse(ref m)) if m.contains("60s")));
        assert!(reply.raw.is_none());
    }
}
