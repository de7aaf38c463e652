use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use pointclaw::RunOptions;

/// Plays point-and-click adventure games by looking at the screen and clicking.
#[derive(Parser)]
#[command(name = "pointclaw")]
#[command(about = "Autonomous point-and-click adventure player", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Select a game window and play until stopped
    Run(RunArgs),

    /// List visible windows
    Windows,

    /// List models offered by the configured providers
    Models {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Path to config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Substring of the game window title
    #[arg(long)]
    window: Option<String>,

    /// Planner model as provider/model
    #[arg(long)]
    model: Option<String>,

    /// Accept click commands from Twitch chat
    #[arg(long, overrides_with = "no_chat")]
    chat: bool,

    #[arg(long, overrides_with = "chat")]
    no_chat: bool,

    /// Stop after this many iterations
    #[arg(long)]
    max_iterations: Option<u64>,
}

impl RunArgs {
    fn into_options(self) -> RunOptions {
        let chat = match (self.chat, self.no_chat) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        RunOptions {
            config: self.config,
            window: self.window,
            model: self.model,
            chat,
            max_iterations: self.max_iterations,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
    pointclaw::init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("stop requested, finishing current step");
                    on_signal.cancel();
                }
            });

            match pointclaw::run(args.into_options(), cancel).await {
                Ok(reason) if !reason.is_fatal() => {
                    tracing::info!(reason = %reason, "session finished");
                    ExitCode::SUCCESS
                }
                Ok(reason) => {
                    tracing::error!(reason = %reason, "session aborted");
                    ExitCode::FAILURE
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to start session");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Windows => match pointclaw::list_windows() {
            Ok(windows) => {
                for w in windows {
                    println!("{:>10}  {:>5}x{:<5}  {}", w.id, w.rect.width, w.rect.height, w.title);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to list windows");
                ExitCode::FAILURE
            }
        },
        Command::Models { config } => {
            let options = RunOptions {
                config,
                ..RunOptions::default()
            };
            match pointclaw::list_models(&options).await {
                Ok(models) => {
                    for m in models {
                        println!("{m}");
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to list models");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
