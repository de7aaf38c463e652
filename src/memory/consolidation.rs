use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::errors::{PointClawError, PointClawResult};
use crate::llm::fence::strip_code_fence;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage};
use crate::memory::objectives::ObjectivesUpdate;
use crate::memory::prompts;
use crate::memory::store::{Consolidation, MemoryStore};
use crate::memory::world_map::MapUpdate;

#[derive(Debug, Deserialize)]
struct NarrativeUpdate {
    summary: String,
    #[serde(default)]
    patterns: String,
    #[serde(default)]
    strategy: String,
    #[serde(default)]
    mechanics: String,
}

impl NarrativeUpdate {
    fn render(&self) -> String {
        format!(
            "Current Game State:\n{}\n\nIdentified Patterns:\n{}\n\nCurrent Strategy:\n{}\n\nGame Mechanics Understanding:\n{}",
            self.summary.trim(),
            self.patterns.trim(),
            self.strategy.trim(),
            self.mechanics.trim(),
        )
    }
}

/// Issues the three consolidation calls (map, objectives, narrative).
///
/// Nothing is written to the store here: the caller applies the returned
/// [`Consolidation`] only when all three calls succeeded.
pub struct Consolidator {
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
    timeout: Duration,
}

impl Consolidator {
    pub fn new(provider: Arc<dyn LlmProvider>, call: CallConfig, timeout: Duration) -> Self {
        Self {
            provider,
            call,
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.call.model
    }

    pub async fn consolidate(&self, store: &MemoryStore) -> PointClawResult<Consolidation> {
        let recent: Vec<_> = store.rolling().iter().cloned().collect();

        let map: MapUpdate = self
            .ask("map", prompts::map_prompt(&recent, &store.world_map().digest()))
            .await?;
        let objectives: ObjectivesUpdate = self
            .ask(
                "objectives",
                prompts::objectives_prompt(&recent, &store.objectives().listing()),
            )
            .await?;
        let narrative: NarrativeUpdate = self
            .ask("narrative", prompts::narrative_prompt(&recent, store.narrative()))
            .await?;

        Ok(Consolidation {
            map,
            objectives,
            narrative: narrative.render(),
        })
    }

    async fn ask<T: DeserializeOwned>(&self, stage: &str, prompt: String) -> PointClawResult<T> {
        let messages = vec![
            ChatMessage::system(prompts::CONSOLIDATION_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        tracing::debug!(stage, model = %self.call.model, "consolidation call");

        let response = tokio::time::timeout(self.timeout, self.provider.chat(messages, &self.call))
            .await
            .map_err(|_| {
                PointClawError::ConsolidationFailure(format!(
                    "{stage}: no response within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| PointClawError::ConsolidationFailure(format!("{stage}: {e}")))?;

        serde_json::from_str(strip_code_fence(&response.content))
            .map_err(|e| PointClawError::ConsolidationFailure(format!("{stage}: invalid JSON: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::llm::types::LlmResponse;
    use crate::memory::rolling::Observation;

    struct Scripted {
        replies: Mutex<VecDeque<PointClawResult<String>>>,
    }

    impl Scripted {
        fn new(replies: Vec<PointClawResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn list_models(&self) -> PointClawResult<Vec<String>> {
            Ok(vec![])
        }

        async fn chat(&self, _messages: Vec<ChatMessage>, _cfg: &CallConfig) -> PointClawResult<LlmResponse> {
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(Ok(content)) => Ok(LlmResponse {
                    content,
                    reasoning: String::new(),
                }),
                Some(Err(e)) => Err(e),
                None => Err(PointClawError::LlmProvider("script exhausted".into())),
            }
        }
    }

    fn call() -> CallConfig {
        CallConfig {
            model: "test".into(),
            stream: false,
            temperature: 0.1,
            max_tokens: 512,
        }
    }

    fn store() -> MemoryStore {
        let mut store = MemoryStore::new(10, "start");
        store.record(Observation::new(1, "a dark hallway", "walked left"));
        store
    }

    #[tokio::test]
    async fn test_three_calls_produce_consolidation() {
        let provider = Scripted::new(vec![
            Ok(r#"```json
{"rooms":[{"name":"Hallway","connections":[{"exit":"left","to":"Library"}]}],"summary":"two rooms"}
```"#
                .into()),
            Ok(r#"{"completed":[],"added":[{"description":"Explore the library","priority":"high"}]}"#.into()),
            Ok(r#"{"summary":"In a hallway","patterns":"none","strategy":"go left","mechanics":"verbs"}"#.into()),
        ]);
        let consolidator = Consolidator::new(provider, call(), Duration::from_secs(5));
        let mut store = store();
        let result = consolidator.consolidate(&store).await.unwrap();
        assert!(result.narrative.contains("Current Strategy:\ngo left"));

        store.apply(result, 10);
        assert!(store.world_map().room("Library").is_some());
        assert_eq!(store.objectives().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_in_last_stage_reports_consolidation_failure() {
        let provider = Scripted::new(vec![
            Ok(r#"{"rooms":[{"name":"Hallway"}]}"#.into()),
            Ok(r#"{"completed":[]}"#.into()),
            Ok("I think we should go left".into()),
        ]);
        let consolidator = Consolidator::new(provider, call(), Duration::from_secs(5));
        let store = store();
        let err = consolidator.consolidate(&store).await.unwrap_err();
        assert!(matches!(err, PointClawError::ConsolidationFailure(ref m) if m.starts_with("narrative")));
        // Nothing was applied.
        assert!(store.world_map().is_empty());
        assert_eq!(store.narrative(), "start");
    }

    #[tokio::test]
    async fn test_provider_error_is_wrapped() {
        let provider = Scripted::new(vec![Err(PointClawError::LlmProvider("503".into()))]);
        let consolidator = Consolidator::new(provider, call(), Duration::from_secs(5));
        let err = consolidator.consolidate(&store()).await.unwrap_err();
        assert!(matches!(err, PointClawError::ConsolidationFailure(ref m) if m.starts_with("map")));
    }
}
