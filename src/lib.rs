//! Character Registry
//!
//! Admin-side registry for a collectible-character catalog. Sudo users
//! upload, update and delete characters; every character is stored in the
//! record store and mirrored as a photo post on a broadcast channel.
//!
//! ## Module Structure
//!
//! - `catalog`: Record model, rarity map, typed field updates
//! - `sequence`: Atomic named counters for character ids
//! - `storage`: Record store (SQLite, in-memory)
//! - `display`: Channel mirror (Telegram, in-memory) and caption template
//! - `probe`: Image URL reachability
//! - `auth`: Sudo-user access guard
//! - `coordinator`: Store/mirror consistency for create, update, delete
//! - `command`: Text commands and the dispatcher
//! - `config`: TOML + environment configuration
//! - `rpc`: Admin HTTP API

pub mod auth;
pub mod catalog;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod display;
pub mod error;
pub mod probe;
pub mod rpc;
pub mod sequence;
pub mod storage;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use auth::AccessGuard;
pub use catalog::{
    CatalogRecord, CharacterId, ExternalRef, FieldUpdate, NewCharacter, Rarity, RecordField,
    CHARACTER_SEQUENCE,
};
pub use command::{AdminCommand, CommandOutput, Dispatcher};
pub use config::RegistryConfig;
pub use coordinator::{MirrorStatus, Outcome, RegistryCoordinator};
pub use display::{DisplayError, DisplaySurface, MemoryDisplay, TelegramSurface};
pub use error::{RegistryError, RegistryResult};
pub use probe::{HttpProbe, StaticProbe, UrlProbe};
pub use sequence::{MemorySequence, SequenceAllocator, FIRST_SEQUENCE_VALUE};
pub use storage::{LocalStorage, MemoryStore, RecordStore, StorageError};
