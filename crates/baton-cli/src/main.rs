//! The `baton` binary: loads configuration, wires the engine, and runs
//! tasks from the terminal.

use baton_brain::{build_brain, BrainConfig, BrainProvider};
use baton_core::{EventBus, Team, ToolRegistry, TOOL_EXECUTOR_AGENT, USER_AGENT};
use baton_engine::{ExecutionMode, FileTaskStore, Orchestrator, StreamChunk, TaskManager, TaskState};
use baton_guard::{GuardrailConfig, RuleGuardrail};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "baton", about = "Baton — multi-agent task orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "baton.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task and print the conversation
    Run {
        /// The task prompt
        prompt: String,
        /// Agent to start with (defaults to the first agent in the team)
        #[arg(long)]
        agent: Option<String>,
        /// Print response text incrementally as it is generated
        #[arg(long)]
        stream: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate the config file and print a summary
    Validate,
}

#[derive(Deserialize)]
struct BatonConfig {
    brain: BrainConfig,
    team: TeamSource,
    #[serde(default)]
    guardrail: GuardrailConfig,
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
}

/// Team topology, either inline under `[team]` or as a path to a separate
/// TOML file (resolved relative to the config file).
#[derive(Deserialize)]
#[serde(untagged)]
enum TeamSource {
    Path(PathBuf),
    Inline(Team),
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

async fn resolve_team(source: TeamSource, config_dir: &Path) -> anyhow::Result<Team> {
    match source {
        TeamSource::Path(path) => {
            let path = if path.is_absolute() {
                path
            } else {
                config_dir.join(path)
            };
            Ok(Team::load(&path).await?)
        }
        // Deserializing an inline table bypasses Team::new, so the topology
        // is revalidated here.
        TeamSource::Inline(team) => Ok(Team::new(
            team.name,
            team.agents,
            team.handoff_rules,
            team.max_rounds,
        )?),
    }
}

fn api_key_env(provider: BrainProvider) -> Option<&'static str> {
    match provider {
        BrainProvider::Anthropic => Some("ANTHROPIC_API_KEY"),
        BrainProvider::OpenAi => Some("OPENAI_API_KEY"),
        BrainProvider::OpenRouter => Some("OPENROUTER_API_KEY"),
        BrainProvider::Groq => Some("GROQ_API_KEY"),
        BrainProvider::Scripted => None,
    }
}

/// Fills an empty `api_key` from the provider's conventional environment
/// variable, so keys stay out of config files.
fn fill_api_key(config: &mut BrainConfig) {
    if !config.api_key.is_empty() {
        return;
    }
    if let Some(var) = api_key_env(config.provider) {
        if let Ok(key) = std::env::var(var) {
            config.api_key = key;
        }
    }
}

async fn build_manager(
    config: BatonConfig,
    config_dir: &Path,
) -> anyhow::Result<TaskManager> {
    let team = Arc::new(resolve_team(config.team, config_dir).await?);
    let mut brain_config = config.brain;
    fill_api_key(&mut brain_config);
    let brain = build_brain(brain_config)?;
    let guard = Arc::new(RuleGuardrail::from_config(&config.guardrail)?);
    let store = Arc::new(FileTaskStore::new(config.data_dir.join("tasks")).await?);

    let orchestrator = Arc::new(Orchestrator::new(
        team,
        brain,
        Arc::new(ToolRegistry::new()),
        guard,
        store,
        Arc::new(EventBus::new()),
    ));
    Ok(TaskManager::new(orchestrator))
}

fn print_transcript(state: &TaskState) {
    for step in &state.history {
        if step.agent_name == USER_AGENT || step.agent_name == TOOL_EXECUTOR_AGENT {
            continue;
        }
        println!("[{}]", step.agent_name);
        println!("{}\n", step.text_content());
    }
}

fn print_outcome(state: &TaskState) {
    if state.is_complete {
        println!(
            "Task {} completed after {} round(s)",
            state.task_id, state.round_count
        );
    } else if state.is_paused {
        let breakpoint = state
            .last_breakpoint
            .as_deref()
            .map(|tag| format!(" (breakpoint: {tag})"))
            .unwrap_or_default();
        println!(
            "Task {} paused after {} round(s){breakpoint}",
            state.task_id, state.round_count
        );
    }
}

async fn run_task(
    config: BatonConfig,
    config_dir: &Path,
    prompt: &str,
    agent: Option<&str>,
    stream: bool,
) -> anyhow::Result<()> {
    let manager = build_manager(config, config_dir).await?;
    let id = manager
        .start_task(prompt, agent, ExecutionMode::Autonomous)
        .await?;
    info!(task_id = %id, "Task started");

    let state = if stream {
        let mut rx = manager.execute_task_streaming(id).await?;
        let mut current_agent = String::new();
        while let Some(chunk) = rx.recv().await {
            match chunk {
                StreamChunk::ContentChunk {
                    agent_name, text, ..
                } => {
                    if agent_name != current_agent {
                        println!("[{agent_name}]");
                        current_agent = agent_name;
                    }
                    print!("{text}");
                    std::io::stdout().flush()?;
                }
                StreamChunk::StreamComplete { .. } => println!("\n"),
                StreamChunk::StreamError { error_message, .. } => {
                    eprintln!("\nstream error: {error_message}");
                }
            }
        }
        manager.inspect_task_state(id).await?
    } else {
        let state = manager.execute_task(id).await?;
        print_transcript(&state);
        state
    };

    print_outcome(&state);
    Ok(())
}

async fn validate_config(config: BatonConfig, config_dir: &Path) -> anyhow::Result<()> {
    let team = resolve_team(config.team, config_dir).await?;
    RuleGuardrail::from_config(&config.guardrail)?;

    println!("Config OK");
    println!(
        "  brain: {:?} / {} (timeout {}s)",
        config.brain.provider, config.brain.model_id, config.brain.timeout_secs
    );
    println!(
        "  team: {} — {} agent(s), {} handoff rule(s), max {} rounds",
        team.name,
        team.agents.len(),
        team.handoff_rules.len(),
        team.max_rounds
    );
    for agent in &team.agents {
        let targets = team.handoff_targets(&agent.name);
        if targets.is_empty() {
            println!("    {}", agent.name);
        } else {
            println!("    {} -> {}", agent.name, targets.join(", "));
        }
    }
    println!(
        "  guardrail: {} policy(ies), max content length {}",
        config.guardrail.policies.len(),
        config.guardrail.max_content_length
    );
    println!("  data dir: {}", config.data_dir.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
        anyhow::anyhow!("Failed to read config file '{}': {e}", cli.config.display())
    })?;
    let config: BatonConfig = toml::from_str(&config_str)?;
    let config_dir = cli
        .config
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    match cli.command {
        Commands::Run {
            prompt,
            agent,
            stream,
        } => run_task(config, &config_dir, &prompt, agent.as_deref(), stream).await,
        Commands::Config { action } => match action {
            ConfigAction::Validate => validate_config(config, &config_dir).await,
        },
    }
}
