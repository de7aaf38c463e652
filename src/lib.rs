pub mod agent_engine;
pub mod arbiter;
pub mod config;
pub mod errors;
pub mod executor;
pub mod llm;
pub mod memory;
pub mod perception;
pub mod planner;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::agent_engine::engine::{Collaborators, GameEngine};
use crate::agent_engine::history::SessionRecorder;
use crate::agent_engine::state::{LoopState, StopReason};
use crate::agent_engine::status::{StatusBoard, StatusView};
use crate::arbiter::arbitration::CommandArbiter;
use crate::arbiter::inbox::chat_channel;
use crate::arbiter::twitch::TwitchChat;
use crate::config::{load_config, AppConfig};
use crate::errors::{PointClawError, PointClawResult};
use crate::executor::input::EnigoMouse;
use crate::llm::registry::{ProviderRegistry, Role};
use crate::memory::consolidation::Consolidator;
use crate::memory::store::MemoryStore;
use crate::memory::world_map::policy_by_name;
use crate::perception::types::WindowInfo;
use crate::perception::window::{find_by_title, WindowSource, XcapWindows};
use crate::planner::action_planner::ActionPlanner;

/// Command-line overrides applied on top of config.toml.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub window: Option<String>,
    pub model: Option<String>,
    pub chat: Option<bool>,
    pub max_iterations: Option<u64>,
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

/// Load config.toml and apply the command-line overrides.
pub fn resolve_config(options: &RunOptions) -> PointClawResult<AppConfig> {
    let mut config = load_config(options.config.as_deref())?;
    if let Some(title) = &options.window {
        config.game.window_title = title.clone();
    }
    if let Some(chat) = options.chat {
        config.chat.enabled = chat;
    }
    if options.max_iterations.is_some() {
        config.run.max_iterations = options.max_iterations;
    }
    config.validate()?;
    Ok(config)
}

/// Select a window and a model, wire every collaborator and run the loop
/// until it stops.
pub async fn run(options: RunOptions, cancel: CancellationToken) -> PointClawResult<StopReason> {
    let config = resolve_config(&options)?;
    let (status, view) = StatusBoard::new();
    tokio::spawn(report_status(view));

    status.set_state(LoopState::SelectingWindow);
    let windows: Arc<XcapWindows> = Arc::new(XcapWindows);
    let target = select_window(windows.as_ref(), &config.game.window_title).await?;
    tracing::info!(id = target.id, title = %target.title, rect = ?target.rect, "target window selected");

    status.set_state(LoopState::SelectingModel);
    let mut registry = ProviderRegistry::from_config(&config);
    select_model(&mut registry, options.model.as_deref()).await?;

    let timeout = config.run.model_timeout();
    let (provider, call) = registry.call_config_for_role(Role::Planner)?;
    let planner = ActionPlanner::new(provider, call, config.game.instructions.clone(), timeout);
    let (provider, call) = registry.call_config_for_role(Role::Memory)?;
    let consolidator = Consolidator::new(provider, call, timeout);

    let policy = policy_by_name(&config.memory.conflict_policy).ok_or_else(|| {
        PointClawError::Config(format!("unknown conflict policy '{}'", config.memory.conflict_policy))
    })?;
    let memory = MemoryStore::with_policy(config.run.history_size, config.game.context.clone(), policy);

    let arbiter = if config.chat.enabled {
        let (sender, inbox) = chat_channel(config.chat.inbox_capacity);
        tokio::spawn(TwitchChat::new(&config.chat, sender).run(cancel.child_token()));
        Some(CommandArbiter::new(inbox, &config.chat)?)
    } else {
        tracing::info!("chat commands disabled");
        None
    };

    let recorder = SessionRecorder::create(&config.session.root())?;
    let parts = Collaborators {
        windows: windows.clone(),
        capture: windows,
        planner,
        consolidator,
        arbiter,
        mouse: EnigoMouse::new()?,
        recorder: Box::new(recorder),
        status,
    };

    let mut engine = GameEngine::new(config.run.clone(), config.grid.clone(), target, memory, parts);
    let reason = engine.run(cancel.clone()).await;
    // Stops the chat reader if the loop ended on its own.
    cancel.cancel();
    Ok(reason)
}

/// Every visible top-level window.
pub fn list_windows() -> PointClawResult<Vec<WindowInfo>> {
    XcapWindows.list_windows()
}

/// Every model the configured providers advertise, as `provider/model`.
pub async fn list_models(options: &RunOptions) -> PointClawResult<Vec<String>> {
    let config = resolve_config(options)?;
    Ok(ProviderRegistry::from_config(&config).list_available_models().await)
}

async fn select_window(windows: &dyn WindowSource, title: &str) -> PointClawResult<WindowInfo> {
    let all = windows.list_windows()?;
    if let Some(found) = find_by_title(&all, title) {
        return Ok(found.clone());
    }
    if all.is_empty() {
        return Err(PointClawError::WindowUnavailable("no visible windows to choose from".into()));
    }
    tracing::warn!(title, "no window title matches, asking interactively");
    let labels: Vec<String> = all
        .iter()
        .map(|w| format!("{} ({}x{})", w.title, w.rect.width, w.rect.height))
        .collect();
    let choice = prompt_choice("Select the game window", &labels).await?;
    Ok(all[choice].clone())
}

/// `--model` wins, then the configured planner role, then the active
/// provider's default. Only when none resolves is the user asked.
async fn select_model(registry: &mut ProviderRegistry, cli_model: Option<&str>) -> PointClawResult<()> {
    if let Some(model) = cli_model {
        return registry.select_model(Role::Planner, model);
    }
    if registry.call_config_for_role(Role::Planner).is_ok() {
        return Ok(());
    }
    let models = registry.list_available_models().await;
    if models.is_empty() {
        return Err(PointClawError::Config(
            "no model configured and no provider returned a model list".into(),
        ));
    }
    let choice = prompt_choice("Select the vision model", &models).await?;
    registry.select_model(Role::Planner, &models[choice])
}

async fn prompt_choice(title: &str, options: &[String]) -> PointClawResult<usize> {
    println!("{title}:");
    for (i, option) in options.iter().enumerate() {
        println!("  {:>2}. {option}", i + 1);
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!("Enter a number (1-{}):", options.len());
        let Some(line) = lines.next_line().await? else {
            return Err(PointClawError::Config("no selection made".into()));
        };
        match line.trim().parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
            _ => println!("'{}' is not a valid choice", line.trim()),
        }
    }
}

/// Log a one-line summary every time the loop publishes a new iteration.
/// Returns once the loop reports that it stopped.
pub async fn report_status(mut view: StatusView) {
    let mut last_iteration = 0;
    while view.changed().await {
        let snapshot = view.latest();
        if snapshot.iteration != last_iteration {
            last_iteration = snapshot.iteration;
            let clicks = snapshot
                .last_clicks
                .iter()
                .map(|c| format!("cell {}", c.cell))
                .collect::<Vec<_>>()
                .join(", ");
            tracing::info!(
                iteration = snapshot.iteration,
                state = ?snapshot.state,
                scene = snapshot.last_description.as_deref().unwrap_or("-"),
                plan = snapshot.last_plan.as_deref().unwrap_or("-"),
                clicks = %clicks,
                chat = snapshot.selected_chat.as_ref().map(|c| c.source.as_str()).unwrap_or("-"),
                failures = snapshot.consecutive_failures,
                "status"
            );
        }
        if snapshot.state.is_stopped() {
            break;
        }
    }
}
