use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PointClawError, PointClawResult};
use crate::perception::types::CropMargins;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default, rename = "loop")]
    pub run: LoopSettings,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    /// Role-to-model mapping. If a role is absent, falls back to active_provider defaults.
    #[serde(default)]
    pub roles: RolesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    /// Default model for this provider (used as fallback when no role config exists).
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// "anthropic" for Claude, None for OpenAI-compatible
    pub adapter: Option<String>,
    /// Optional API key stored in config.toml (falls back to env var POINTCLAW_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Maps agent roles to specific provider+model combinations.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RolesConfig {
    /// Vision model that looks at the annotated screenshot and plans clicks.
    pub planner: Option<RoleEntry>,
    /// Text model used by periodic memory consolidation.
    pub memory: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature for this role.
    pub temperature: Option<f64>,
}

fn default_temperature() -> f64 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default = "default_window_title")]
    pub window_title: String,
    /// Initial narrative context, replaced by the first consolidation.
    #[serde(default = "default_game_context")]
    pub context: String,
    #[serde(default)]
    pub instructions: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            window_title: default_window_title(),
            context: default_game_context(),
            instructions: String::new(),
        }
    }
}

fn default_window_title() -> String {
    "Maniac Mansion".into()
}

fn default_game_context() -> String {
    "I'm playing a point-and-click adventure game. I have to explore how the story unfolds \
     through what I see on the screen."
        .into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_columns")]
    pub columns: u32,
    #[serde(default = "default_rows")]
    pub rows: u32,
    #[serde(default)]
    pub crop: CropMargins,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            rows: default_rows(),
            crop: CropMargins::default(),
        }
    }
}

fn default_columns() -> u32 {
    16
}

fn default_rows() -> u32 {
    12
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSettings {
    #[serde(default = "default_screenshot_interval_ms")]
    pub screenshot_interval_ms: u64,
    #[serde(default = "default_click_interval_ms")]
    pub click_interval_ms: u64,
    /// K: rolling window of recent scene descriptions.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// M: consolidate long-term memory every M iterations.
    #[serde(default = "default_consolidation_every")]
    pub consolidation_every: u64,
    /// N: merge one chat command every N iterations.
    #[serde(default = "default_chat_merge_every")]
    pub chat_merge_every: u64,
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
    #[serde(default = "default_max_failures")]
    pub window_retry_budget: u32,
    #[serde(default = "default_max_consolidation_failures")]
    pub max_consolidation_failures: u32,
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,
    #[serde(default)]
    pub max_iterations: Option<u64>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            screenshot_interval_ms: default_screenshot_interval_ms(),
            click_interval_ms: default_click_interval_ms(),
            history_size: default_history_size(),
            consolidation_every: default_consolidation_every(),
            chat_merge_every: default_chat_merge_every(),
            max_consecutive_failures: default_max_failures(),
            window_retry_budget: default_max_failures(),
            max_consolidation_failures: default_max_consolidation_failures(),
            model_timeout_secs: default_model_timeout_secs(),
            max_iterations: None,
        }
    }
}

impl LoopSettings {
    pub fn screenshot_interval(&self) -> Duration {
        Duration::from_millis(self.screenshot_interval_ms)
    }

    pub fn click_interval(&self) -> Duration {
        Duration::from_millis(self.click_interval_ms)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

fn default_screenshot_interval_ms() -> u64 {
    3000
}

fn default_click_interval_ms() -> u64 {
    2000
}

fn default_history_size() -> usize {
    10
}

fn default_consolidation_every() -> u64 {
    10
}

fn default_chat_merge_every() -> u64 {
    5
}

fn default_max_failures() -> u32 {
    5
}

fn default_max_consolidation_failures() -> u32 {
    3
}

fn default_model_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_chat_server")]
    pub server: String,
    #[serde(default = "default_nick")]
    pub nick: String,
    /// Falls back to the TWITCH_TOKEN env var.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
    /// Lines held between merge windows before the oldest are dropped.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: default_channel(),
            server: default_chat_server(),
            nick: default_nick(),
            token: None,
            rate_limit: default_rate_limit(),
            rate_window_secs: default_rate_window_secs(),
            max_age_secs: default_max_age_secs(),
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

fn default_inbox_capacity() -> usize {
    256
}

fn default_channel() -> String {
    "PointAndClickAI".into()
}

fn default_chat_server() -> String {
    "irc.chat.twitch.tv:6667".into()
}

fn default_nick() -> String {
    "pointclaw".into()
}

fn default_rate_limit() -> u32 {
    3
}

fn default_rate_window_secs() -> u64 {
    60
}

fn default_max_age_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// How contradicting map facts are settled: "most_recent_wins" or "keep_first".
    #[serde(default = "default_conflict_policy")]
    pub conflict_policy: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            conflict_policy: default_conflict_policy(),
        }
    }
}

fn default_conflict_policy() -> String {
    "most_recent_wins".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    /// Root directory for per-session logs. Defaults to the platform data dir.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl SessionConfig {
    /// `<data_local_dir>/pointclaw/sessions`, falling back to `./sessions`.
    pub fn root(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .map(|d| d.join("pointclaw").join("sessions"))
            .unwrap_or_else(|| PathBuf::from("sessions"))
    }
}

impl AppConfig {
    pub fn validate(&self) -> PointClawResult<()> {
        if self.grid.columns == 0 || self.grid.rows == 0 {
            return Err(PointClawError::Config("grid columns and rows must be > 0".into()));
        }
        let crop = self.grid.crop;
        let fits = |a: u32, b: u32| a.checked_add(b).is_some_and(|sum| sum <= i32::MAX as u32);
        if !fits(crop.left, crop.right) || !fits(crop.top, crop.bottom) {
            return Err(PointClawError::Config("grid.crop margins are too large".into()));
        }
        if self.run.history_size == 0 {
            return Err(PointClawError::Config("loop.history_size must be > 0".into()));
        }
        if self.run.consolidation_every == 0 || self.run.chat_merge_every == 0 {
            return Err(PointClawError::Config(
                "loop.consolidation_every and loop.chat_merge_every must be > 0".into(),
            ));
        }
        if self.run.model_timeout_secs == 0 {
            return Err(PointClawError::Config("loop.model_timeout_secs must be > 0".into()));
        }
        if crate::memory::world_map::policy_by_name(&self.memory.conflict_policy).is_none() {
            return Err(PointClawError::Config(format!(
                "unknown memory.conflict_policy '{}'",
                self.memory.conflict_policy
            )));
        }
        if self.chat.enabled && self.chat.rate_limit == 0 {
            return Err(PointClawError::Config("chat.rate_limit must be > 0".into()));
        }
        if self.chat.enabled && self.chat.inbox_capacity == 0 {
            return Err(PointClawError::Config("chat.inbox_capacity must be > 0".into()));
        }
        Ok(())
    }
}

fn resolve_config_path() -> PointClawResult<Option<PathBuf>> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(Some(candidate));
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(Some(candidate));
    }

    Ok(None)
}

/// Load the config from `explicit`, or search next to the executable and in the
/// working directory. Falls back to defaults when no file is found.
pub fn load_config(explicit: Option<&Path>) -> PointClawResult<AppConfig> {
    let path = match explicit {
        Some(p) => {
            if !p.exists() {
                return Err(PointClawError::Config(format!(
                    "config file {} does not exist",
                    p.display()
                )));
            }
            Some(p.to_path_buf())
        }
        None => resolve_config_path()?,
    };

    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)?;
            let config = parse_config(&content)?;
            tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
            config
        }
        None => {
            tracing::warn!("config.toml not found; using built-in defaults");
            AppConfig::default()
        }
    };
    config.validate()?;
    Ok(config)
}

pub fn parse_config(content: &str) -> PointClawResult<AppConfig> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.run.history_size, 10);
        assert_eq!(cfg.run.consolidation_every, 10);
        assert_eq!(cfg.run.chat_merge_every, 5);
        assert_eq!(cfg.run.click_interval_ms, 2000);
        assert_eq!(cfg.grid.columns, 16);
        assert_eq!(cfg.grid.rows, 12);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let cfg = parse_config(
            r#"
            [llm]
            active_provider = "local"

            [llm.providers.local]
            display_name = "Ollama"
            api_base = "http://localhost:11434/v1"
            model = "llava"

            [llm.roles.planner]
            provider = "local"
            model = "llava:13b"

            [grid]
            columns = 10
            rows = 8

            [grid.crop]
            top = 20

            [loop]
            chat_merge_every = 3
            "#,
        )
        .unwrap();
        assert_eq!(cfg.llm.active_provider, "local");
        assert_eq!(cfg.llm.providers["local"].temperature, 0.1);
        assert_eq!(cfg.llm.roles.planner.as_ref().unwrap().model, "llava:13b");
        assert_eq!(cfg.grid.columns, 10);
        assert_eq!(cfg.grid.crop.top, 20);
        assert_eq!(cfg.grid.crop.left, 0);
        assert_eq!(cfg.run.chat_merge_every, 3);
        assert_eq!(cfg.run.consolidation_every, 10);
    }

    #[test]
    fn test_validate_rejects_zero_grid() {
        let mut cfg = AppConfig::default();
        cfg.grid.rows = 0;
        assert!(matches!(cfg.validate(), Err(PointClawError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_overflowing_crop() {
        let mut cfg = AppConfig::default();
        cfg.grid.crop.left = u32::MAX;
        cfg.grid.crop.right = 1;
        assert!(matches!(cfg.validate(), Err(PointClawError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_conflict_policy() {
        let mut cfg = AppConfig::default();
        cfg.memory.conflict_policy = "coin_flip".into();
        assert!(matches!(cfg.validate(), Err(PointClawError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[game]\nwindow_title = \"Day of the Tentacle\"\n").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.game.window_title, "Day of the Tentacle");
        assert_eq!(cfg.memory.conflict_policy, "most_recent_wins");
    }

    #[test]
    fn test_missing_explicit_path_is_config_error() {
        let err = load_config(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, PointClawError::Config(_)));
    }
}
