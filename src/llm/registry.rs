use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AppConfig, LlmConfig, RoleEntry};
use crate::errors::{PointClawError, PointClawResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::anthropic::AnthropicProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Agent roles that issue model calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Looks at the annotated screenshot and plans clicks.
    Planner,
    /// Rewrites long-term memory during consolidation.
    Memory,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Memory => "memory",
        }
    }
}

/// Registry of all available LLM providers, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            active,
            llm_config: LlmConfig::default(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, id: &str) -> PointClawResult<Arc<dyn LlmProvider>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| PointClawError::Config(format!("Provider '{id}' not registered")))
    }

    pub fn get_active(&self) -> PointClawResult<Arc<dyn LlmProvider>> {
        self.get(&self.active)
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Pin a role to `provider/model`, replacing whatever config.toml said.
    pub fn select_model(&mut self, role: Role, qualified: &str) -> PointClawResult<()> {
        let (provider, model) = qualified.split_once('/').ok_or_else(|| {
            PointClawError::Config(format!("model '{qualified}' must be written as provider/model"))
        })?;
        if !self.providers.contains_key(provider) {
            return Err(PointClawError::Config(format!("Provider '{provider}' not registered")));
        }
        let slot = match role {
            Role::Planner => &mut self.llm_config.roles.planner,
            Role::Memory => &mut self.llm_config.roles.memory,
        };
        let previous = slot.take();
        *slot = Some(RoleEntry {
            provider: provider.to_string(),
            model: model.to_string(),
            stream: previous.as_ref().map(|p| p.stream).unwrap_or(false),
            temperature: previous.and_then(|p| p.temperature),
        });
        tracing::info!(role = role.as_str(), provider, model, "model selected");
        Ok(())
    }

    /// `provider/model` names of every configured role, or None when unset.
    pub fn role_model(&self, role: Role) -> Option<String> {
        self.role_entry(role).map(|e| format!("{}/{}", e.provider, e.model))
    }

    fn role_entry(&self, role: Role) -> Option<&RoleEntry> {
        match role {
            Role::Planner => self.llm_config.roles.planner.as_ref(),
            Role::Memory => self.llm_config.roles.memory.as_ref(),
        }
    }

    /// Return the provider and call configuration for an agent role.
    ///
    /// Role resolution order:
    /// 1. `[llm.roles.<role>]` in config.toml (or a `select_model` override)
    /// 2. Memory falls back to the planner's model
    /// 3. Fallback: active provider with its default model / temperature
    pub fn call_config_for_role(&self, role: Role) -> PointClawResult<(Arc<dyn LlmProvider>, CallConfig)> {
        let entry = match role {
            Role::Memory => self.role_entry(Role::Memory).or_else(|| self.role_entry(Role::Planner)),
            Role::Planner => self.role_entry(Role::Planner),
        };

        if let Some(entry) = entry {
            let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
                PointClawError::Config(format!(
                    "Role '{}' references unknown provider '{}'",
                    role.as_str(),
                    entry.provider
                ))
            })?;
            let temperature = entry.temperature.unwrap_or_else(|| {
                self.llm_config
                    .providers
                    .get(&entry.provider)
                    .map(|p| p.temperature)
                    .unwrap_or(0.1)
            });
            tracing::debug!(
                role = role.as_str(),
                provider = %entry.provider,
                model = %entry.model,
                stream = entry.stream,
                temperature,
                "resolved role config"
            );
            return Ok((
                provider,
                CallConfig {
                    model: entry.model.clone(),
                    stream: entry.stream,
                    temperature,
                    max_tokens: DEFAULT_MAX_TOKENS,
                },
            ));
        }

        let provider = self.get_active()?;
        let (model, temperature) = self
            .llm_config
            .providers
            .get(&self.active)
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.1));
        if model.is_empty() {
            return Err(PointClawError::Config(format!(
                "no model configured for role '{}'",
                role.as_str()
            )));
        }
        tracing::debug!(
            role = role.as_str(),
            provider = %self.active,
            model = %model,
            "role not configured, using active provider fallback"
        );
        Ok((
            provider,
            CallConfig {
                model,
                stream: false,
                temperature,
                max_tokens: DEFAULT_MAX_TOKENS,
            },
        ))
    }

    /// Union of every provider's model listing as `provider/model`.
    /// Providers that fail to answer are logged and skipped.
    pub async fn list_available_models(&self) -> Vec<String> {
        let mut all = Vec::new();
        for id in self.list_names() {
            let Some(provider) = self.providers.get(&id) else { continue };
            match provider.list_models().await {
                Ok(models) => all.extend(models.into_iter().map(|m| format!("{id}/{m}"))),
                Err(e) => tracing::warn!(provider = %id, error = %e, "model listing failed"),
            }
        }
        all
    }

    /// Build a registry from the loaded app config.
    /// API keys are read from environment variables named `POINTCLAW_<ID>_API_KEY`.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self {
            providers: HashMap::new(),
            active: config.llm.active_provider.clone(),
            llm_config: config.llm.clone(),
        };
        for (id, entry) in &config.llm.providers {
            let api_key = std::env::var(format!("POINTCLAW_{}_API_KEY", id.to_uppercase()))
                .unwrap_or_else(|_| entry.api_key.clone().unwrap_or_default());
            let provider: Arc<dyn LlmProvider> = match entry.adapter.as_deref() {
                Some("anthropic") => Arc::new(AnthropicProvider::new(
                    id.clone(),
                    entry.api_base.clone(),
                    api_key,
                )),
                Some(other) if other != "openai" => {
                    tracing::warn!(provider = %id, adapter = other, "unknown adapter, using OpenAI-compatible");
                    Arc::new(OpenAiCompatibleProvider::new(id.clone(), entry.api_base.clone(), api_key))
                }
                _ => Arc::new(OpenAiCompatibleProvider::new(
                    id.clone(),
                    entry.api_base.clone(),
                    api_key,
                )),
            };
            registry.register(provider);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const CONFIG: &str = r#"
[llm]
active_provider = "ollama"

[llm.providers.ollama]
display_name = "Ollama"
api_base = "http://localhost:11434/v1"
model = "llava"
temperature = 0.3

[llm.providers.claude]
display_name = "Claude"
api_base = "https://api.anthropic.com/v1"
model = "claude-sonnet"
adapter = "anthropic"

[llm.roles.planner]
provider = "claude"
model = "claude-sonnet"
temperature = 0.0
"#;

    #[test]
    fn test_role_resolution_and_memory_fallback() {
        let registry = ProviderRegistry::from_config(&parse_config(CONFIG).unwrap());
        assert_eq!(registry.list_names(), vec!["claude", "ollama"]);

        let (provider, cfg) = registry.call_config_for_role(Role::Planner).unwrap();
        assert_eq!(provider.name(), "claude");
        assert_eq!(cfg.model, "claude-sonnet");
        assert_eq!(cfg.temperature, 0.0);

        let (provider, _) = registry.call_config_for_role(Role::Memory).unwrap();
        assert_eq!(provider.name(), "claude");
    }

    #[test]
    fn test_active_provider_fallback() {
        let mut cfg = parse_config(CONFIG).unwrap();
        cfg.llm.roles.planner = None;
        let registry = ProviderRegistry::from_config(&cfg);
        let (provider, call) = registry.call_config_for_role(Role::Planner).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(call.model, "llava");
        assert_eq!(call.temperature, 0.3);
    }

    #[test]
    fn test_select_model_override() {
        let mut registry = ProviderRegistry::from_config(&parse_config(CONFIG).unwrap());
        registry.select_model(Role::Planner, "ollama/qwen2.5vl").unwrap();
        assert_eq!(registry.role_model(Role::Planner).as_deref(), Some("ollama/qwen2.5vl"));
        assert!(registry.select_model(Role::Planner, "missing/x").is_err());
        assert!(registry.select_model(Role::Planner, "no-slash").is_err());
    }

    #[test]
    fn test_shipped_config_huggingface_block() {
        let shipped = include_str!("../../config.toml");
        let cfg = parse_config(shipped).unwrap();
        cfg.validate().unwrap();
        assert!(!cfg.llm.providers.contains_key("huggingface"));

        // Uncomment the Hugging Face block the way a user would.
        let mut in_block = false;
        let enabled: Vec<&str> = shipped
            .lines()
            .map(|line| {
                if line == "# [llm.providers.huggingface]" {
                    in_block = true;
                } else if line.trim().is_empty() {
                    in_block = false;
                }
                match line.strip_prefix("# ") {
                    Some(rest) if in_block && (rest.starts_with('[') || rest.contains(" = ")) => rest,
                    _ => line,
                }
            })
            .collect();
        let mut registry = ProviderRegistry::from_config(&parse_config(&enabled.join("\n")).unwrap());
        assert!(registry.list_names().contains(&"huggingface".to_string()));

        registry
            .select_model(Role::Planner, "huggingface/Qwen/Qwen2.5-VL-7B-Instruct")
            .unwrap();
        let (provider, call) = registry.call_config_for_role(Role::Planner).unwrap();
        assert_eq!(provider.name(), "huggingface");
        assert_eq!(call.model, "Qwen/Qwen2.5-VL-7B-Instruct");
    }
}
