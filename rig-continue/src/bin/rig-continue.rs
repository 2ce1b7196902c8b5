//! Drives an external generation command to completion from the shell.

use clap::{Parser, Subcommand};
use rig_continue::prelude::*;
use rig_continue_provider::adapters::command::DEFAULT_COMMAND_NAME;
use rig_continue_provider::discover_command;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (default: <config_dir>/rig-continue/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generates text for a prompt and prints it once complete
    Generate {
        /// Backend executable (default: settings, then $RIG_CONTINUE_COMMAND, then $PATH)
        #[arg(long)]
        command: Option<PathBuf>,
        /// Extra argument for the backend; repeatable
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,
        /// System instructions sent as the first message
        #[arg(long)]
        system: Option<String>,
        /// Treat the prompt as a transcript to work from
        #[arg(long)]
        transcript: bool,
        /// Model identifier passed to the backend
        #[arg(long)]
        model: Option<String>,
        /// Topic, question or transcript text
        prompt: String,
    },
    /// Prints the resolved settings as TOML
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    init_tracing();

    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::ShowConfig => {
            print!("{}", settings.to_toml_string()?);
        }
        Commands::Generate {
            command,
            args,
            system,
            transcript,
            model,
            prompt,
        } => {
            if let Some(model) = model {
                settings.generation.model = model;
            }
            settings.command.args.extend(args);

            let program = discover_command(
                command.or_else(|| settings.command.path.clone()),
                DEFAULT_COMMAND_NAME,
            )?;
            tracing::info!(event = "backend_resolved", program = %program.display());

            let provider = CommandProvider::new(settings.command_config(program));
            let orchestrator = settings.build_loop(Arc::new(provider), settings.throttle())?;

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!(event = "interrupted", "Cancelling generation");
                    on_interrupt.cancel();
                }
            });

            let instructions = system.unwrap_or_default();
            let (text, metrics) = if transcript {
                orchestrator
                    .generate_from_transcript(&instructions, &prompt, &cancel)
                    .await?
            } else {
                orchestrator
                    .generate_from_topic(&instructions, &prompt, &cancel)
                    .await?
            };

            tracing::info!(
                event = "generation_metrics",
                provider_requests = metrics.provider_requests,
                continuations = metrics.continuations,
                wall_time_ms = u64::try_from(metrics.wall_time.as_millis()).unwrap_or(u64::MAX),
                estimated_output_tokens = metrics.estimated_output_tokens
            );
            println!("{text}");
        }
    }

    Ok(())
}
