//! Character Registry CLI
//!
//! Runs the admin HTTP API, or executes a single admin command against the
//! configured store and channel.

use anyhow::{Context, Result};
use character_registry::command::{render_error, render_output, Verb, UNAUTHORIZED_REPLY};
use character_registry::{
    AccessGuard, AdminCommand, CommandOutput, Dispatcher, DisplaySurface, HttpProbe,
    LocalStorage, MemoryDisplay, MemorySequence, MemoryStore, RecordStore, RegistryConfig,
    RegistryCoordinator, SequenceAllocator, StaticProbe, TelegramSurface, UrlProbe,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "chara-registry")]
#[command(about = "Character catalog registry: upload, update and delete characters")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "REGISTRY_CONFIG")]
    config: Option<PathBuf>,

    /// Identity of the operator issuing the command
    #[arg(long, env = "CALLER_ID", default_value = "")]
    caller: String,

    /// Keep records and counters in memory instead of SQLite
    #[arg(long)]
    memory: bool,

    /// Mirror to an in-process surface instead of the Telegram channel
    #[arg(long)]
    dry_display: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the admin HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Register a new character
    Upload {
        img_url: String,
        name: String,
        anime: String,
        rarity: String,
    },
    /// Change one field of a character
    Update {
        id: String,
        field: String,
        value: String,
    },
    /// Remove a character and its channel post
    Delete { id: String },
    /// Re-attempt the channel post of a character
    Resync { id: String },
    /// Print a stored character
    Show { id: String },
}

fn build_dispatcher(cli: &Cli, config: &RegistryConfig) -> Result<Dispatcher> {
    let (sequences, store): (Arc<dyn SequenceAllocator>, Arc<dyn RecordStore>) = if cli.memory {
        info!("Using in-memory storage");
        (Arc::new(MemorySequence::new()), Arc::new(MemoryStore::new()))
    } else {
        let local = LocalStorage::open(&config.storage.database_path)
            .with_context(|| format!("opening {:?}", config.storage.database_path))?;
        (Arc::new(local.clone()), Arc::new(local))
    };

    let display: Arc<dyn DisplaySurface> = if cli.dry_display {
        Arc::new(MemoryDisplay::new())
    } else if config.display.is_configured() {
        Arc::new(TelegramSurface::from_config(&config.display))
    } else {
        warn!("No bot token or channel configured, posts stay in memory");
        Arc::new(MemoryDisplay::new())
    };

    let probe: Arc<dyn UrlProbe> = if config.probe.enabled {
        Arc::new(HttpProbe::new(config.probe.timeout()))
    } else {
        Arc::new(StaticProbe(true))
    };

    let coordinator = RegistryCoordinator::new(sequences, store, display, probe);
    Ok(Dispatcher::new(
        AccessGuard::with_sudo_users(&config.sudo_users),
        Arc::new(coordinator),
    ))
}

fn one_shot(command: &Command) -> Option<(Verb, Vec<&str>)> {
    let parts = match command {
        Command::Serve { .. } => return None,
        Command::Upload {
            img_url,
            name,
            anime,
            rarity,
        } => (
            Verb::Upload,
            vec![img_url.as_str(), name.as_str(), anime.as_str(), rarity.as_str()],
        ),
        Command::Update { id, field, value } => (
            Verb::Update,
            vec![id.as_str(), field.as_str(), value.as_str()],
        ),
        Command::Delete { id } => (Verb::Delete, vec![id.as_str()]),
        Command::Resync { id } => (Verb::Resync, vec![id.as_str()]),
        Command::Show { id } => (Verb::Show, vec![id.as_str()]),
    };
    Some(parts)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("character_registry=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = RegistryConfig::load(cli.config.as_deref())?;
    let dispatcher = build_dispatcher(&cli, &config)?;

    let Some((verb, args)) = one_shot(&cli.command) else {
        if let Command::Serve { port: Some(port) } = &cli.command {
            config.server.port = *port;
        }
        info!(
            "Starting character registry ({} sudo users)",
            config.sudo_users.len()
        );
        character_registry::rpc::serve(Arc::new(dispatcher), &config.server).await?;
        return Ok(ExitCode::SUCCESS);
    };

    if verb.is_mutating() && !dispatcher.guard().is_privileged(&cli.caller) {
        eprintln!("{}", UNAUTHORIZED_REPLY);
        return Ok(ExitCode::FAILURE);
    }

    let command = match AdminCommand::from_args(verb, &args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    match dispatcher.execute(&cli.caller, command).await {
        Ok(output) => {
            println!("{}", render_output(verb, &output));
            match output {
                CommandOutput::Changed(outcome) if outcome.is_partial() => Ok(ExitCode::from(2)),
                _ => Ok(ExitCode::SUCCESS),
            }
        }
        Err(e) => {
            eprintln!("{}", render_error(&e));
            Ok(ExitCode::FAILURE)
        }
    }
}
