//! Chat with a persona agent from the terminal.
//!
//! Requires `OPENAI_API_KEY`. Each line read from stdin is one inbound
//! message; the agent's reply (and any follow-up) is printed back.

use std::path::PathBuf;
use std::sync::Arc;

use agent_adapters::openai::{OpenAiAdapter, OpenAiConfig};
use agent_config::RuntimeConfig;
use agent_kernel::{AgentRuntime, LocalAccountResolver, TimeProvider};
use agent_primitives::{Actor, ActorDetails, ActorId, Message};
use agent_telemetry::audit::FileCompletionLog;
use agent_telemetry::tracing_support;
use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

/// Console persona agent
#[derive(Parser, Debug)]
#[command(name = "console-agent")]
#[command(about = "Talk to a memory-grounded persona agent")]
#[command(version)]
struct Cli {
    /// JSON runtime configuration; `AGENT_*` variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Chat model name
    #[arg(short, long, default_value = "gpt-4o-mini")]
    model: String,

    /// Base URL of an OpenAI-compatible API
    #[arg(long)]
    base_url: Option<String>,

    /// Display name of the agent
    #[arg(long, default_value = "Ada")]
    agent_name: String,

    /// One-line description of the agent
    #[arg(long, default_value = "A curious and friendly companion")]
    tagline: String,

    /// Display name used for you
    #[arg(long, default_value = "You")]
    user_name: String,

    /// Append every completion attempt to this NDJSON file
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset
    #[arg(long, default_value = tracing_support::DEFAULT_FILTER)]
    log: String,
}

fn load_config(path: Option<&PathBuf>) -> Result<RuntimeConfig> {
    let config = match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_support::init(&cli.log)?;

    let config = load_config(cli.config.as_ref())?;

    let mut openai = OpenAiConfig::from_env(&cli.model).with_timeout(config.request_timeout());
    if let Some(base_url) = &cli.base_url {
        openai = openai.with_base_url(base_url)?;
    }
    let adapter = Arc::new(OpenAiAdapter::new(openai).context("configuring OpenAI adapter")?);

    let agent = Actor::new(ActorId::random(), &cli.agent_name)?.with_details(ActorDetails {
        tagline: cli.tagline.clone(),
        ..ActorDetails::default()
    });
    let user = Actor::new(ActorId::random(), &cli.user_name)?;
    let accounts = LocalAccountResolver::new()
        .with_actor(agent.clone())
        .with_actor(user.clone());

    let mut builder = AgentRuntime::builder(agent.clone())
        .config(config)
        .model(adapter.clone())
        .embedding_adapter(adapter)
        .accounts(Arc::new(accounts))
        .provider(Arc::new(TimeProvider))
        .with_default_actions()?
        .with_default_evaluators()?;
    if let Some(path) = &cli.audit_log {
        let log = FileCompletionLog::open(path)
            .await
            .with_context(|| format!("opening audit log {}", path.display()))?;
        builder = builder.completion_log(Arc::new(log));
    }
    let runtime = builder.build()?;

    let relationship = runtime.ensure_relationship(user.id(), agent.id()).await?;
    info!(room_id = %relationship.room_id, agent = %agent.display_name(), "ready");

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let message = Message::new(user.id(), agent.id(), relationship.room_id, line);
        let outcome = match runtime.handle_message(message).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "turn failed");
                continue;
            }
        };
        if outcome.fallback {
            stdout.write_all(b"(no reply)\n").await?;
            continue;
        }

        let name = agent.display_name();
        let mut printed = vec![format!("{name}: {}", outcome.reply.text)];
        let followup = outcome
            .action_output
            .as_ref()
            .and_then(|output| output.get("text"))
            .and_then(|text| text.as_str());
        if let Some(text) = followup {
            printed.push(format!("{name}: {text}"));
        }
        printed.push(String::new());
        stdout.write_all(printed.join("\n").as_bytes()).await?;
        stdout.flush().await?;
    }

    runtime.shutdown();
    Ok(())
}
