use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use research_agent::{CommandAnswerer, ResearchAssistant};
use research_config::AssistantConfig;
use research_session::{ConversationTurn, SessionStats};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "research-assistant")]
#[command(about = "Research assistant with bounded multi-turn sessions", long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,

    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive multi-turn research session
    Chat {
        /// Program that answers queries (overrides assistant.answer_command)
        #[arg(last = true)]
        answer_cmd: Vec<String>,
    },

    /// Ask a single question
    Ask {
        /// The research question
        #[arg(short, long)]
        query: String,

        /// Export the session after answering
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Program that answers queries (overrides assistant.answer_command)
        #[arg(last = true)]
        answer_cmd: Vec<String>,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        AssistantConfig::from_yaml(&cli.config)?
    } else {
        AssistantConfig::default()
    };

    init_logging(cli.verbose, &config.logging.level)?;
    if cli.config.exists() {
        info!("Loaded configuration from: {:?}", cli.config);
    } else {
        info!("Using default configuration");
    }

    match cli.command {
        Commands::Chat { answer_cmd } => {
            let assistant = build_assistant(config, answer_cmd)?;
            interactive_chat(assistant).await?;
        }
        Commands::Ask {
            query,
            export,
            answer_cmd,
        } => {
            let assistant = build_assistant(config, answer_cmd)?;
            ask_once(assistant, &query, export.as_deref()).await?;
        }
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config)?);
        }
    }

    Ok(())
}

fn build_assistant(config: AssistantConfig, answer_cmd: Vec<String>) -> Result<ResearchAssistant> {
    let answerer = if answer_cmd.is_empty() {
        CommandAnswerer::from_config(&config)
            .ok_or_else(|| anyhow!("No answer command configured; pass one after `--` or set assistant.answer_command"))??
    } else {
        CommandAnswerer::new(answer_cmd)?
    };
    info!("Answering queries with: {}", answerer.program());

    Ok(ResearchAssistant::new(config, Arc::new(answerer)))
}

async fn ask_once(assistant: ResearchAssistant, query: &str, export: Option<&Path>) -> Result<()> {
    let turn = assistant.ask(query).await?;
    print_turn(&turn);

    if let Some(destination) = export {
        match assistant.export(Some(destination)).await {
            Ok(path) => println!("💾 Session exported to {}", path.display()),
            Err(e) => println!("❌ Export failed: {e}"),
        }
    }
    Ok(())
}

async fn interactive_chat(assistant: ResearchAssistant) -> Result<()> {
    let sweeper = assistant.spawn_cleanup();
    let session_id = assistant.ensure_session().await;

    println!("🔎 Research Assistant");
    println!("Session: {session_id}");
    println!("Commands: /history /stats /metrics /export [file] /clear /cleanup, 'exit' to quit");
    println!("═══════════════════════════════════════\n");

    loop {
        print!("You> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("Goodbye!");
            break;
        }

        if let Some(command) = input.strip_prefix('/') {
            run_command(&assistant, command).await;
            continue;
        }

        let turn = assistant.ask(input).await?;
        print_turn(&turn);
    }

    if let Some(handle) = sweeper {
        handle.abort();
    }
    Ok(())
}

async fn run_command(assistant: &ResearchAssistant, command: &str) {
    let mut parts = command.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or_default();
    let argument = parts.next().map(str::trim).filter(|s| !s.is_empty());

    match name {
        "history" => println!("\n{}", assistant.format_history().await),
        "stats" => match assistant.stats().await {
            Some(stats) => print_stats(&stats),
            None => println!("No active session"),
        },
        "metrics" => {
            let summary = assistant.latency_summary().await;
            println!("\n📊 Request Metrics:");
            println!("  Requests: {}", summary.total_requests);
            println!("  Success rate: {:.1}%", summary.success_rate);
            println!("  Average latency: {:.0} ms", summary.average_latency_ms);
            println!("  Max latency: {} ms", summary.max_latency_ms);
            println!("  Timed out: {}", summary.timed_out_requests);
            println!("  Uptime: {}s\n", summary.uptime_seconds);
        }
        "export" => match assistant.export(argument.map(Path::new)).await {
            Ok(path) => println!("💾 Session exported to {}", path.display()),
            Err(e) => println!("❌ Export failed: {e}"),
        },
        "clear" => {
            if assistant.clear().await {
                let session_id = assistant.ensure_session().await;
                println!("🧹 Session cleared, new session: {session_id}");
            } else {
                println!("No active session to clear");
            }
        }
        "cleanup" => {
            let removed = assistant.cleanup_expired().await;
            println!("Removed {removed} expired sessions");
        }
        other => println!("Unknown command: /{other}"),
    }
}

fn print_turn(turn: &ConversationTurn) {
    if turn.error_occurred {
        println!("\n⚠️  {}", turn.ai_response);
    } else {
        println!("\nAssistant> {}", turn.ai_response);
    }
    println!("(turn {} | {:.2}s)\n", turn.turn_number, turn.processing_time);
}

fn print_stats(stats: &SessionStats) {
    println!("\n📊 Session Statistics:");
    println!("  Session ID: {}", stats.session_id);
    println!("  Created: {}", stats.created_at.to_rfc3339());
    println!("  Last activity: {}", stats.last_activity.to_rfc3339());
    println!("  Turns: {}", stats.total_turns);
    println!("  Errors: {}", stats.error_count);
    println!("  Total processing time: {:.2}s", stats.total_processing_time);
    println!("  Average processing time: {:.2}s\n", stats.average_processing_time);
}

fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = if verbose { "debug" } else { level };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    Ok(())
}
