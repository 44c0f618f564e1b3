// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use saturn_config::Config;
use saturn_coord::{
    browse_agents, spawn_listener, AgentStatusTool, Coordination, Coordinator, ListAgentsTool,
    SendMessageTool,
};
use saturn_core::{Agent, AgentEvent};
use saturn_discovery::{filter_endpoints, Discoverer, EndpointFilter, ServiceCache};
use saturn_model::EndpointPool;
use saturn_tools::{
    ApprovalMediator, ApprovalRequest, BashTool, EditFileTool, ListDirTool, ReadFileTool,
    ReadLedger, ToolRegistry, Truncator, WriteFileTool,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Arc::new(saturn_config::load(cli.config.as_deref())?);

    match &cli.command {
        Some(Commands::ShowConfig) => {
            println!("{}", serde_yaml::to_string(config.as_ref()).unwrap_or_default());
            Ok(())
        }
        Some(Commands::Discover { timeout }) => run_discover(&config, *timeout).await,
        Some(Commands::Agents) => run_agents(&config).await,
        Some(Commands::Models) => run_models(&config).await,
        Some(Commands::Run {
            prompt,
            no_coordination,
            assume_yes,
        }) => run_agent(&config, prompt, *no_coordination, *assume_yes).await,
        None => {
            if cli.prompt.is_empty() {
                anyhow::bail!("no prompt given; try `saturn run <prompt>` or `saturn --help`");
            }
            run_agent(&config, &cli.prompt, false, false).await
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("SATURN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

// ── discover ──────────────────────────────────────────────────────────────────

async fn run_discover(config: &Config, timeout_override: Option<u64>) -> anyhow::Result<()> {
    let timeout = Duration::from_secs(timeout_override.unwrap_or(config.discovery.timeout_secs));
    eprintln!(
        "browsing _{}._tcp for {}...",
        config.discovery.service_name,
        humantime::format_duration(timeout)
    );

    let discoverer = Discoverer::new(&config.discovery.service_name, timeout)
        .with_legacy_fallback(config.discovery.legacy_fallback);
    let endpoints = discoverer.discover().await?;

    for ep in &endpoints {
        let features = if ep.features.is_empty() {
            "-".to_string()
        } else {
            ep.features.join(",")
        };
        println!(
            "{:<24} {:<28} prio {:>3}  load {}/{}  [{}]",
            ep.instance,
            ep.base_url(),
            ep.priority,
            ep.current_load,
            ep.max_concurrent,
            features,
        );
    }
    Ok(())
}

// ── models ────────────────────────────────────────────────────────────────────

async fn run_models(config: &Config) -> anyhow::Result<()> {
    let discoverer = Discoverer::new(
        &config.discovery.service_name,
        Duration::from_secs(config.discovery.timeout_secs),
    )
    .with_legacy_fallback(config.discovery.legacy_fallback);
    let pool = EndpointPool::connect(discoverer.discover().await?).await?;

    for ep in pool.endpoints() {
        match pool.client().list_models(ep).await {
            Ok(models) => {
                for m in models {
                    println!("{:<24} {}", ep.instance, m.id);
                }
            }
            Err(e) => eprintln!("{}: {e}", ep.instance),
        }
    }
    Ok(())
}

// ── agents ────────────────────────────────────────────────────────────────────

async fn run_agents(config: &Config) -> anyhow::Result<()> {
    let peers = browse_agents(&config.coordination).await?;
    if peers.is_empty() {
        println!("no agents on the network");
        return Ok(());
    }
    for record in peers {
        println!(
            "{:<20} {:<8} task: {:<30} last: {}",
            record.agent_id,
            record.status.to_string(),
            if record.task.is_empty() { "-" } else { &record.task },
            if record.action.is_empty() { "-" } else { &record.action },
        );
    }
    Ok(())
}

// ── run ───────────────────────────────────────────────────────────────────────

async fn run_agent(
    config: &Arc<Config>,
    prompt: &[String],
    no_coordination: bool,
    assume_yes: bool,
) -> anyhow::Result<()> {
    let prompt = if prompt.is_empty() {
        let mut buf = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf)
            .context("reading prompt from stdin")?;
        buf.trim().to_string()
    } else {
        prompt.join(" ")
    };
    if prompt.is_empty() {
        anyhow::bail!("empty prompt");
    }

    // Discovery → cache → filter → health-gated pool.
    let discoverer = Discoverer::new(
        &config.discovery.service_name,
        Duration::from_secs(config.discovery.timeout_secs),
    )
    .with_legacy_fallback(config.discovery.legacy_fallback);

    let cache = Arc::new(ServiceCache::new(Duration::from_secs(
        config.discovery.cache_ttl_secs,
    )));
    cache.set_all(discoverer.discover().await?);
    {
        let discoverer = discoverer.clone();
        cache.start_background_refresh(move || {
            let d = discoverer.clone();
            async move { Ok(d.discover().await?) }
        });
    }

    let filter = EndpointFilter {
        require_features: config.discovery.require_features.clone(),
        require_api: config.discovery.require_api.clone(),
        min_version: config.discovery.min_version.clone(),
        exclude_instances: config.discovery.exclude_instances.clone(),
    };
    let mut candidates = filter_endpoints(&cache.get_all(), &filter);
    // Best-scoring endpoint first so the rotation starts there.
    candidates.sort_by(|a, b| {
        saturn_discovery::score(b)
            .partial_cmp(&saturn_discovery::score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let pool = Arc::new(EndpointPool::connect(candidates).await?);
    eprintln!(
        "using {} endpoint(s): {}",
        pool.len(),
        pool.endpoints()
            .iter()
            .map(|e| e.instance.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    // Tool registry.
    let ledger = Arc::new(ReadLedger::new());
    let truncator = Truncator::new(
        config.tools.truncate_lines,
        config.tools.truncate_bytes,
        "saturn",
    );
    let mut registry = ToolRegistry::new();
    registry.register(ReadFileTool::new(Arc::clone(&ledger)));
    registry.register(WriteFileTool::new(Arc::clone(&ledger)));
    registry.register(EditFileTool::new(Arc::clone(&ledger)));
    registry.register(ListDirTool);
    registry.register(BashTool::new(config.tools.shell_timeout_secs, truncator));

    // Coordination fabric.
    let coordinator: Option<Arc<Coordinator>> = if no_coordination {
        None
    } else {
        let agent_id = format!("agent-{}", &uuid::Uuid::new_v4().to_string()[..8]);
        match Coordinator::new(&agent_id, &config.coordination) {
            Ok(c) => Some(Arc::new(c)),
            Err(e) => {
                eprintln!("coordination disabled: {e}");
                None
            }
        }
    };
    let coord_handle: Option<Arc<dyn Coordination>> = coordinator
        .clone()
        .map(|c| c as Arc<dyn Coordination>);
    if let Some(coord) = &coord_handle {
        registry.register(AgentStatusTool::new(Arc::clone(coord)));
        registry.register(SendMessageTool::new(Arc::clone(coord)));
        registry.register(ListAgentsTool::new(Arc::clone(coord)));
    }

    // Approval mediation: auto tools run, everything else asks on stderr.
    let (approval_tx, approval_rx) = tokio::sync::mpsc::channel::<ApprovalRequest>(8);
    let mediator = Arc::new(ApprovalMediator::with_channel(
        &config.tools,
        approval_tx,
        Duration::from_secs(config.agent.approval_timeout_secs),
    ));
    let approver = tokio::spawn(run_approver(approval_rx, assume_yes));

    let listener = coord_handle.as_ref().map(|coord| {
        spawn_listener(
            Arc::clone(coord),
            Duration::from_secs(config.coordination.listen_interval_secs),
            |msg| eprintln!("[{} → {}] {}: {}", msg.from, msg.to, msg.kind, msg.content),
        )
    });

    let mut agent = Agent::new(pool, Arc::new(registry), Arc::clone(config), mediator);
    if let Some(coord) = &coord_handle {
        agent = agent.with_coordinator(Arc::clone(coord));
    }

    // Event printer: streamed text to stdout, tool activity to stderr.
    let (tx, mut rx) = tokio::sync::mpsc::channel::<AgentEvent>(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                AgentEvent::TextDelta(t) => {
                    print!("{t}");
                    let _ = std::io::stdout().flush();
                }
                AgentEvent::TextComplete(_) => println!(),
                AgentEvent::ToolCallStarted(tc) => eprintln!("→ {} {}", tc.name, tc.args),
                AgentEvent::ToolCallFinished {
                    tool_name,
                    is_error,
                    ..
                } => {
                    if is_error {
                        eprintln!("✗ {tool_name} failed");
                    } else {
                        eprintln!("✓ {tool_name}");
                    }
                }
                AgentEvent::Error(e) => eprintln!("error: {e}"),
                _ => {}
            }
        }
    });

    let result = agent.submit(&prompt, tx).await;

    let _ = printer.await;
    approver.abort();
    if let Some(listener) = listener {
        listener.stop().await;
    }
    cache.stop_background_refresh().await;
    if let Some(coord) = &coordinator {
        coord.shutdown();
    }
    result
}

/// Answer approval requests interactively on the terminal.
async fn run_approver(
    mut rx: tokio::sync::mpsc::Receiver<ApprovalRequest>,
    assume_yes: bool,
) {
    use tokio::io::{AsyncBufReadExt, BufReader};
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Some(request) = rx.recv().await {
        if assume_yes {
            let _ = request.reply.send(true);
            continue;
        }
        eprintln!(
            "approve {} {} ? [y/N] ",
            request.tool,
            serde_json::to_string(&request.args).unwrap_or_default()
        );
        let answer = lines.next_line().await.ok().flatten().unwrap_or_default();
        let allow = matches!(answer.trim(), "y" | "Y" | "yes");
        let _ = request.reply.send(allow);
    }
}
