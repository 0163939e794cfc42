// sotto — relay chat client CLI
//
// Cross-platform (macOS, Linux, Windows) command-line front-end for the
// Sotto relay connection. Payloads are treated as opaque strings; encrypt
// before you send.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use sotto_core::{
    Catalog, ChatDelegate, ChatProcessor, Collaborators, HistoryManager, IdentityManager,
    IdentityStore, MessageRecord, PresencePinger, RelayConnection, SledStorage,
    StaticRelayDirectory, StatusLevel, StorageBackend,
};
use std::sync::Arc;
use std::time::Duration;

use sotto_core::store::MessageDirection as Direction;

#[derive(Parser)]
#[command(name = "sotto")]
#[command(about = "Sotto — Encrypted Relay Messaging", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize identity and configuration
    Init,
    /// Show identity information
    Identity,
    /// Connect and print inbound messages until interrupted
    Listen,
    /// Send a pre-encrypted message to a peer topic
    Send {
        /// Recipient topic, e.g. user:<hex-public-key>
        to: String,
        message: String,
    },
    /// Show connection status
    Status,
    /// View message history
    History {
        #[arg(short, long)]
        peer: Option<String>,
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage the presence peer list
    Peers {
        #[command(subcommand)]
        action: PeerAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[derive(Subcommand)]
enum PeerAction {
    Add { topic: String },
    Remove { topic: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Identity => cmd_identity().await,
        Commands::Listen => cmd_listen().await,
        Commands::Send { to, message } => cmd_send(to, message).await,
        Commands::Status => cmd_status().await,
        Commands::History { peer, limit } => cmd_history(peer, limit).await,
        Commands::Config { action } => cmd_config(action).await,
        Commands::Peers { action } => cmd_peers(action).await,
    }
}

/// Everything a connected command needs
struct App {
    config: config::Config,
    identity: Arc<IdentityManager>,
    history: HistoryManager,
    connection: RelayConnection,
}

fn open_backend(config: &config::Config) -> Result<Arc<dyn StorageBackend>> {
    let storage_path = match &config.storage_path {
        Some(path) => path.clone(),
        None => config::Config::data_dir()?
            .join("storage")
            .to_string_lossy()
            .into_owned(),
    };
    let backend = SledStorage::new(&storage_path).context("Failed to open storage")?;
    Ok(Arc::new(backend))
}

fn build_app(delegate: Arc<dyn ChatDelegate>) -> Result<App> {
    let config = config::Config::load()?;
    if config.relay_urls.is_empty() {
        anyhow::bail!("No relay configured. Run: sotto config set relay_urls <ws-url>");
    }

    let backend = open_backend(&config)?;

    let identity = Arc::new(IdentityManager::with_store(IdentityStore::persistent(
        backend.clone(),
    )));
    identity.initialize().context("Failed to load identity")?;

    let history = HistoryManager::new(backend);
    let processor = Arc::new(ChatProcessor::new(history.clone(), delegate));
    let pinger = Arc::new(PresencePinger::new(config.peers.clone()));

    let collaborators = Collaborators {
        identity: identity.clone(),
        directory: Arc::new(StaticRelayDirectory::new(config.relay_urls.clone())),
        processor,
        dispatcher: pinger.clone(),
        intl: Arc::new(Catalog::new()),
    };

    let connection = RelayConnection::spawn(collaborators, config.client_config());
    pinger.wire(connection.clone());

    Ok(App {
        config,
        identity,
        history,
        connection,
    })
}

/// Wait until the channel is joined, or fail past the join deadline
async fn wait_connected(app: &App) -> Result<()> {
    let deadline = Duration::from_secs(app.config.join_timeout_secs + 5);
    tokio::time::timeout(deadline, async {
        loop {
            let info = app.connection.info().await?;
            if info.connected {
                return Ok::<(), anyhow::Error>(());
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .context("Timed out waiting for the relay connection")??;

    Ok(())
}

struct SilentDelegate;

impl ChatDelegate for SilentDelegate {
    fn message_received(&self, _from: &str, _content: &str) {}
}

struct PrintDelegate;

impl ChatDelegate for PrintDelegate {
    fn message_received(&self, from: &str, content: &str) {
        println!("{} {}: {}", "←".bright_blue(), from.bright_cyan(), content);
    }
}

async fn cmd_init() -> Result<()> {
    println!("{}", "Initializing Sotto...".bold());
    println!();

    let config = config::Config::load()?;
    println!("  {} Configuration", "✓".green());

    let data_dir = config::Config::data_dir()?;
    println!("  {} Data directory: {}", "✓".green(), data_dir.display());

    let backend = open_backend(&config)?;
    let identity = IdentityManager::with_store(IdentityStore::persistent(backend));
    identity
        .initialize()
        .context("Failed to initialize identity")?;

    println!("  {} Identity ready", "✓".green());
    println!();

    let public_key = identity.public_key_hex().unwrap_or_default();
    println!("{}", "Identity Information:".bold());
    println!("  ID:         {}", identity.identity_id().unwrap_or_default().bright_cyan());
    println!("  Public Key: {}", public_key.bright_yellow());
    println!("  Channel:    {}", format!("user:{public_key}").bright_cyan());
    println!();

    println!("{}", "Next steps:".bold());
    println!(
        "  • Set a relay:  {}",
        "sotto config set relay_urls wss://relay.example/socket/websocket".bright_green()
    );
    println!("  • Listen:       {}", "sotto listen".bright_green());

    Ok(())
}

async fn cmd_identity() -> Result<()> {
    let config = config::Config::load()?;
    let backend = open_backend(&config)?;
    let identity = IdentityManager::with_store(IdentityStore::persistent(backend));
    identity.initialize().context("Failed to load identity")?;

    let public_key = identity.public_key_hex().unwrap_or_default();
    println!("{}", "Identity Information".bold());
    println!("  ID:         {}", identity.identity_id().unwrap_or_default().bright_cyan());
    println!("  Public Key: {}", public_key.bright_yellow());
    println!("  Channel:    {}", format!("user:{public_key}").bright_cyan());

    Ok(())
}

async fn cmd_listen() -> Result<()> {
    let app = build_app(Arc::new(PrintDelegate))?;

    println!("{}", "Sotto — Listening...".bold());
    println!();

    let mut status = app.connection.status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            if current.message.is_empty() {
                continue;
            }
            match current.level {
                StatusLevel::Info => println!("{} {}", "•".bright_green(), current.message),
                StatusLevel::Error => println!("{} {}", "✗".red(), current.message.red()),
            }
        }
    });

    app.connection.connect().await;

    tokio::signal::ctrl_c().await?;
    println!();
    println!("Shutting down...");

    app.history.flush();
    Ok(())
}

async fn cmd_send(to: String, message: String) -> Result<()> {
    let app = build_app(Arc::new(SilentDelegate))?;

    app.connection.connect().await;
    wait_connected(&app).await?;

    match app.connection.send(&to, &message).await {
        Ok(ack) => {
            println!("{} Sent", "✓".green());
            if !ack.is_null() {
                println!("  Ack: {}", ack.to_string().dimmed());
            }

            let record = MessageRecord::new_sent(to, message);
            let _ = app.history.add(record);
            app.history.flush();
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e.to_string().red());
        }
    }

    Ok(())
}

async fn cmd_status() -> Result<()> {
    let app = build_app(Arc::new(SilentDelegate))?;

    app.connection.connect().await;
    // Give the establishment a moment, then report whatever state it reached
    let _ = tokio::time::timeout(Duration::from_secs(3), wait_connected(&app)).await;

    let info = app
        .connection
        .info()
        .await
        .context("Connection task is gone")?;

    println!("{}", "Sotto Status".bold());
    println!();
    println!("State:     {}", info.state.to_string().bright_cyan());
    println!("Connected: {}", info.connected);
    println!("Socket:    {}", if info.has_socket { "open" } else { "none" });
    println!(
        "Channel:   {}",
        info.topic.as_deref().unwrap_or("(none)").bright_cyan()
    );
    if !info.status.message.is_empty() {
        println!("Status:    {}", info.status.message);
    }
    println!();
    println!("Identity:  {}", app.identity.identity_id().unwrap_or_default().dimmed());
    println!("Messages:  {}", app.history.count());

    Ok(())
}

async fn cmd_history(peer_filter: Option<String>, limit: usize) -> Result<()> {
    let config = config::Config::load()?;
    let backend = open_backend(&config)?;
    let history = HistoryManager::new(backend);

    let messages = match &peer_filter {
        Some(peer) => history.conversation(peer, limit)?,
        None => history.recent(None, limit)?,
    };

    if messages.is_empty() {
        println!("{}", "No messages found.".dimmed());
        return Ok(());
    }

    println!("{} ({} messages)", "Message History".bold(), messages.len());
    println!();

    for msg in messages {
        let direction = match msg.direction {
            Direction::Sent => "→".bright_green(),
            Direction::Received => "←".bright_blue(),
        };

        let time = format_timestamp(msg.timestamp).dimmed();

        println!("{} {} [{}]", direction, msg.peer_id.bright_cyan(), time);
        println!("   {}", msg.content);
        println!();
    }

    Ok(())
}

async fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<20} {}", key.bright_cyan(), value);
            }

            println!();
            println!("{}", "Presence peers:".bold());
            if config.peers.is_empty() {
                println!("  {}", "(none configured)".dimmed());
            } else {
                for (i, peer) in config.peers.iter().enumerate() {
                    println!("  {}. {}", i + 1, peer);
                }
            }
        }
    }

    Ok(())
}

async fn cmd_peers(action: PeerAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        PeerAction::Add { topic } => {
            config.add_peer(topic.clone())?;
            println!("{} Added peer: {}", "✓".green(), topic.bright_cyan());
        }

        PeerAction::Remove { topic } => {
            config.remove_peer(&topic)?;
            println!("{} Removed peer", "✓".green());
        }

        PeerAction::List => {
            if config.peers.is_empty() {
                println!("{}", "No peers configured.".dimmed());
            } else {
                println!("{} ({} total)", "Presence Peers".bold(), config.peers.len());
                for peer in &config.peers {
                    println!("  {} {}", "•".bright_green(), peer.bright_cyan());
                }
            }
        }
    }

    Ok(())
}

fn format_timestamp(timestamp: u64) -> String {
    use chrono::{DateTime, Local, Utc};

    let dt = DateTime::from_timestamp(timestamp as i64, 0).unwrap_or_else(Utc::now);
    let local: DateTime<Local> = dt.into();

    local.format("%Y-%m-%d %H:%M:%S").to_string()
}
