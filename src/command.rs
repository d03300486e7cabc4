//! Admin command surface
//!
//! Turns operator text such as `/upload <url> <name> <anime> <rarity>` into a
//! typed [`AdminCommand`], checks the caller, runs it through the coordinator
//! and renders the reply. Field names are resolved to a [`FieldUpdate`] here,
//! before anything reaches the coordinator.

use crate::auth::AccessGuard;
use crate::catalog::{CatalogRecord, CharacterId, FieldUpdate, NewCharacter};
use crate::coordinator::{MirrorStatus, Outcome, RegistryCoordinator};
use crate::error::{RegistryError, RegistryResult};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub const UPLOAD_USAGE: &str = "Wrong ❌️ format... eg. /upload Img_url muzan-kibutsuji Demon-slayer 3

img_url character-name anime-name rarity-number

Use rarity number accordingly rarity Map:
1 (⚪️ Common), 2 (🟣 Rare), 3 (🟡 Legendary), 4 (🟢 Medium), 5 (💮 Special)";

pub const UPDATE_USAGE: &str = "Incorrect format. Use: /update id field new_value

Fields: img_url, name, anime, rarity";

pub const DELETE_USAGE: &str = "Incorrect format. Use: /delete ID";

pub const RESYNC_USAGE: &str = "Incorrect format. Use: /resync ID";

pub const SHOW_USAGE: &str = "Incorrect format. Use: /show ID";

pub const UNAUTHORIZED_REPLY: &str =
    "You are not authorized to use this command. Contact the owner.";

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0}")]
    Usage(&'static str),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Upload,
    Update,
    Delete,
    Resync,
    Show,
}

impl Verb {
    /// Parse the first word of a command ("/upload", "/upload@SomeBot", "upload")
    pub fn parse(word: &str) -> Option<Self> {
        let word = word.trim_start_matches('/');
        let word = word.split('@').next().unwrap_or(word);
        match word.to_ascii_lowercase().as_str() {
            "upload" => Some(Verb::Upload),
            "update" => Some(Verb::Update),
            "delete" => Some(Verb::Delete),
            "resync" => Some(Verb::Resync),
            "show" => Some(Verb::Show),
            _ => None,
        }
    }

    pub fn is_mutating(self) -> bool {
        !matches!(self, Verb::Show)
    }

    fn usage(self) -> &'static str {
        match self {
            Verb::Upload => UPLOAD_USAGE,
            Verb::Update => UPDATE_USAGE,
            Verb::Delete => DELETE_USAGE,
            Verb::Resync => RESYNC_USAGE,
            Verb::Show => SHOW_USAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Upload(NewCharacter),
    Update { id: CharacterId, update: FieldUpdate },
    Delete(CharacterId),
    Resync(CharacterId),
    Show(CharacterId),
}

impl AdminCommand {
    pub fn verb(&self) -> Verb {
        match self {
            AdminCommand::Upload(_) => Verb::Upload,
            AdminCommand::Update { .. } => Verb::Update,
            AdminCommand::Delete(_) => Verb::Delete,
            AdminCommand::Resync(_) => Verb::Resync,
            AdminCommand::Show(_) => Verb::Show,
        }
    }

    /// Build a command from its verb and whitespace-separated arguments
    pub fn from_args(verb: Verb, args: &[&str]) -> Result<Self, CommandError> {
        let usage = || CommandError::Usage(verb.usage());
        match verb {
            Verb::Upload => match args {
                [url, name, anime, rarity] => Ok(AdminCommand::Upload(NewCharacter::parse(
                    url, name, anime, rarity,
                )?)),
                _ => Err(usage()),
            },
            Verb::Update => match args {
                [id, field, value] => Ok(AdminCommand::Update {
                    id: CharacterId::new(*id),
                    update: FieldUpdate::parse(field, value)?,
                }),
                _ => Err(usage()),
            },
            Verb::Delete => match args {
                [id] => Ok(AdminCommand::Delete(CharacterId::new(*id))),
                _ => Err(usage()),
            },
            Verb::Resync => match args {
                [id] => Ok(AdminCommand::Resync(CharacterId::new(*id))),
                _ => Err(usage()),
            },
            Verb::Show => match args {
                [id] => Ok(AdminCommand::Show(CharacterId::new(*id))),
                _ => Err(usage()),
            },
        }
    }

    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let (verb, args) = split_command(text)?;
        Self::from_args(verb, &args)
    }
}

fn split_command(text: &str) -> Result<(Verb, Vec<&str>), CommandError> {
    let mut words = text.split_whitespace();
    let first = words.next().unwrap_or_default();
    let verb =
        Verb::parse(first).ok_or_else(|| CommandError::UnknownCommand(first.to_string()))?;
    Ok((verb, words.collect()))
}

/// What a successfully executed command produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    Changed(Outcome),
    Record(CatalogRecord),
}

/// Runs admin commands: access check first, then the coordinator
pub struct Dispatcher {
    guard: AccessGuard,
    coordinator: Arc<RegistryCoordinator>,
}

impl Dispatcher {
    pub fn new(guard: AccessGuard, coordinator: Arc<RegistryCoordinator>) -> Self {
        Self { guard, coordinator }
    }

    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    pub fn coordinator(&self) -> &RegistryCoordinator {
        &self.coordinator
    }

    pub async fn execute(&self, caller: &str, command: AdminCommand) -> RegistryResult<CommandOutput> {
        if command.verb().is_mutating() {
            self.guard.authorize(caller)?;
        }
        debug!("Executing {:?} for {}", command.verb(), caller);

        let coordinator = &self.coordinator;
        let output = match command {
            AdminCommand::Upload(new) => CommandOutput::Changed(coordinator.create(new).await?),
            AdminCommand::Update { id, update } => {
                CommandOutput::Changed(coordinator.update(&id, update).await?)
            }
            AdminCommand::Delete(id) => CommandOutput::Changed(coordinator.delete(&id).await?),
            AdminCommand::Resync(id) => CommandOutput::Changed(coordinator.resync(&id).await?),
            AdminCommand::Show(id) => CommandOutput::Record(coordinator.get(&id).await?),
        };
        Ok(output)
    }

    /// Handle one line of operator text and return the reply to show them
    pub async fn handle_text(&self, caller: &str, text: &str) -> String {
        let (verb, args) = match split_command(text) {
            Ok(parsed) => parsed,
            Err(e) => return e.to_string(),
        };

        // unauthorized callers learn nothing about the argument format
        if verb.is_mutating() && !self.guard.is_privileged(caller) {
            info!("Rejected /{:?} from {}", verb, caller);
            return UNAUTHORIZED_REPLY.to_string();
        }

        let command = match AdminCommand::from_args(verb, &args) {
            Ok(command) => command,
            Err(CommandError::Registry(e)) => return render_error(&e),
            Err(e) => return e.to_string(),
        };

        match self.execute(caller, command).await {
            Ok(output) => render_output(verb, &output),
            Err(e) => render_error(&e),
        }
    }
}

pub fn render_output(verb: Verb, output: &CommandOutput) -> String {
    match output {
        CommandOutput::Record(record) => format!(
            "ID: {}\nName: {}\nAnime: {}\nRarity: {} {}\nImage: {}\nPost: {}",
            record.id,
            record.display_name,
            record.group_name,
            record.rarity.marker(),
            record.rarity.label(),
            record.image_url,
            record
                .external_ref
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "not shown".to_string()),
        ),
        CommandOutput::Changed(outcome) => render_outcome(verb, outcome),
    }
}

fn render_outcome(verb: Verb, outcome: &Outcome) -> String {
    let id = &outcome.record.id;
    match (&outcome.mirror, verb) {
        (MirrorStatus::Failed { reason }, Verb::Delete) => {
            format!("Character {} deleted, but the channel was not updated: {}", id, reason)
        }
        (MirrorStatus::Failed { reason }, _) => format!(
            "Character {} saved, but the channel post is out of date ({}). Run /resync {} to retry.",
            id, reason, id
        ),
        (_, Verb::Upload) => format!("Character added successfully! ID: {}", id),
        (_, Verb::Delete) => format!("Character {} deleted successfully.", id),
        (MirrorStatus::Skipped, _) => {
            format!("Character {} updated. It has no channel post yet.", id)
        }
        (MirrorStatus::Synced, Verb::Resync) => format!("Character {} is shown on the channel.", id),
        (MirrorStatus::Synced, _) => format!("Character {} updated successfully.", id),
    }
}

pub fn render_error(err: &RegistryError) -> String {
    match err {
        RegistryError::Unauthorized(_) => UNAUTHORIZED_REPLY.to_string(),
        RegistryError::Validation(msg) => format!("Invalid input: {}", msg),
        RegistryError::NotFound(id) => format!("No character found with ID {}.", id),
        RegistryError::InvalidField(msg) => format!("Invalid field {}", msg),
        RegistryError::StoreUnavailable(msg) => {
            format!("The registry is unavailable right now, nothing was changed: {}", msg)
        }
    }
}
