use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use guildflow_core::config::AppConfig;
use guildflow_core::event::EngineEvent;
use guildflow_core::traits::SessionStore;
use guildflow_core::types::Session;
use guildflow_discord::DiscordClient;
use guildflow_graph::combination::filtered_target_options;
use guildflow_graph::node::NodeData;
use guildflow_graph::{edit, resources_before, Engine, WorkflowDocument};
use guildflow_store::SqliteStore;

#[derive(Parser)]
#[command(name = "guildflow", version, about = "Run guild provisioning workflows")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "guildflow.toml", env = "GUILDFLOW_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the nodes and edges of a workflow
    Inspect {
        workflow: PathBuf,
    },
    /// Show the roles, channels and flags visible to a node
    Resources {
        workflow: PathBuf,
        node: String,
    },
    /// Execute one node against a session
    Run {
        workflow: PathBuf,
        node: String,
        /// Session name
        #[arg(short, long)]
        session: String,
    },
    /// Choose an option on a select-branch node
    Select {
        workflow: PathBuf,
        node: String,
        option: String,
    },
    /// Record a pair on a record-combination node
    Pair {
        workflow: PathBuf,
        node: String,
        source: String,
        target: String,
        #[arg(long)]
        memo: Option<String>,
    },
    /// Show target options for a record-combination node
    Targets {
        workflow: PathBuf,
        node: String,
        /// Currently selected source
        #[arg(long)]
        source: Option<String>,
    },
    /// Clear every execution result so the workflow can run again
    Reset {
        workflow: PathBuf,
    },
    /// Manage sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Create a session bound to a guild
    Create {
        name: String,
        #[arg(long)]
        guild: String,
    },
    /// Show a session and its flags
    Show {
        name: String,
    },
    /// List sessions
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("guildflow=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Inspect { workflow } => inspect(&workflow)?,
        Commands::Resources { workflow, node } => show_resources(&workflow, &node)?,
        Commands::Run {
            workflow,
            node,
            session,
        } => run_node(&config, &workflow, &node, &session).await?,
        Commands::Select {
            workflow,
            node,
            option,
        } => {
            let mut store = WorkflowDocument::load(&workflow)?.into_store()?;
            edit::select_option(&mut store, &node, &option)?;
            WorkflowDocument::from_state(store.state()).save(&workflow)?;
            println!("Selected {} on {}", option, node);
        }
        Commands::Pair {
            workflow,
            node,
            source,
            target,
            memo,
        } => {
            let mut store = WorkflowDocument::load(&workflow)?.into_store()?;
            let id = edit::record_pair(&mut store, &node, &source, &target, memo)?;
            WorkflowDocument::from_state(store.state()).save(&workflow)?;
            println!("Recorded pair {} ({} -> {})", id, source, target);
        }
        Commands::Targets {
            workflow,
            node,
            source,
        } => show_targets(&workflow, &node, source.as_deref())?,
        Commands::Reset { workflow } => {
            let mut store = WorkflowDocument::load(&workflow)?.into_store()?;
            store.reset_execution();
            WorkflowDocument::from_state(store.state()).save(&workflow)?;
            println!("Reset {}", workflow.display());
        }
        Commands::Session { action } => {
            let db = SqliteStore::open(&config.database_path())?;
            session_command(&db, action).await?;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

fn inspect(workflow: &Path) -> anyhow::Result<()> {
    let doc = WorkflowDocument::load(workflow)?;
    println!("{} nodes, {} edges", doc.nodes.len(), doc.edges.len());
    for node in &doc.nodes {
        let status = match node.executed_at {
            Some(at) => format!("executed {}", at.format("%Y-%m-%d %H:%M")),
            None if node.data.is_executable() => "pending".to_string(),
            None => "-".to_string(),
        };
        println!("  {:<24} {:<24} {}", node.id, node.type_name(), status);
    }
    for edge in &doc.edges {
        match &edge.source_handle {
            Some(handle) => println!("  {} -[{}]-> {}", edge.source, handle, edge.target),
            None => println!("  {} -> {}", edge.source, edge.target),
        }
    }
    Ok(())
}

fn show_resources(workflow: &Path, node: &str) -> anyhow::Result<()> {
    let doc = WorkflowDocument::load(workflow)?;
    if !doc.nodes.iter().any(|n| n.id == node) {
        bail!("no node {} in {}", node, workflow.display());
    }
    let catalog = resources_before(node, &doc.nodes, &doc.edges);
    if catalog.is_empty() {
        println!("Nothing upstream of {}", node);
        return Ok(());
    }
    for role in catalog.role_options() {
        println!("role     {:<24} from {}", role.name, role.source_node_id);
    }
    for channel in catalog.channel_options() {
        println!(
            "channel  {:<24} from {} ({})",
            channel.name,
            channel.source_node_id,
            channel.channel_type.as_str()
        );
    }
    for flag in catalog.flag_options() {
        println!("flag     {:<24} from {}", flag.key, flag.source_node_id);
    }
    Ok(())
}

fn show_targets(workflow: &Path, node: &str, source: Option<&str>) -> anyhow::Result<()> {
    let doc = WorkflowDocument::load(workflow)?;
    let data = doc
        .nodes
        .iter()
        .find(|n| n.id == node)
        .map(|n| &n.data)
        .with_context(|| format!("no node {}", node))?;
    let NodeData::RecordCombination(data) = data else {
        bail!("{} is not a recordCombination node", node);
    };
    for option in filtered_target_options(&data.config, &data.pairs, data.target_pool(), source) {
        match option.reason {
            Some(reason) => println!("  [x] {:<20} {}", option.label, reason),
            None => println!("  [ ] {}", option.label),
        }
    }
    Ok(())
}

async fn run_node(
    config: &AppConfig,
    workflow: &Path,
    node_id: &str,
    session_name: &str,
) -> anyhow::Result<()> {
    let discord = config
        .discord
        .as_ref()
        .context("no [discord] section in config")?;
    let db = Arc::new(SqliteStore::open(&config.database_path())?);
    let mut session = db
        .find_session(session_name)
        .await?
        .with_context(|| format!("no session named {}", session_name))?;

    let mut store = WorkflowDocument::load(workflow)?.into_store()?;
    let engine = Engine::with_config(
        Arc::new(DiscordClient::new(&discord.bot_token)),
        db.clone(),
        db,
        &config.engine,
    );

    let mut events = engine.events().subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                EngineEvent::Progress { current, total, .. } => {
                    println!("  [{}/{}]", current, total)
                }
                EngineEvent::ItemFailed { item, error, .. } => {
                    println!("  failed {}: {}", item, error)
                }
                _ => {}
            }
        }
    });

    let result = engine.execute(&mut store, &mut session, node_id).await;
    // Partial progress is saved even when items failed.
    WorkflowDocument::from_state(store.state()).save(workflow)?;
    drop(engine);
    let _ = printer.await;

    let report = result?;
    if report.executed {
        info!(node_id, succeeded = report.succeeded, "Done");
    } else {
        warn!(node_id, failed = report.failures.len(), "Incomplete; run again to retry");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn session_command(db: &SqliteStore, action: SessionAction) -> anyhow::Result<()> {
    match action {
        SessionAction::Create { name, guild } => {
            if db.find_session(&name).await?.is_some() {
                bail!("session {} already exists", name);
            }
            let session = Session::new(name, guild);
            db.save_session(&session).await?;
            println!("Created session {} ({})", session.name, session.id);
        }
        SessionAction::Show { name } => {
            let session = db
                .find_session(&name)
                .await?
                .with_context(|| format!("no session named {}", name))?;
            println!("{} ({}) guild {}", session.name, session.id, session.guild_id);
            for (key, value) in &session.game_flags {
                println!("  {} = {}", key, value);
            }
        }
        SessionAction::List => {
            for session in db.list_sessions()? {
                println!(
                    "{:<24} guild {:<20} created {}",
                    session.name,
                    session.guild_id,
                    session.created_at.format("%Y-%m-%d")
                );
            }
        }
    }
    Ok(())
}
