//! Display surface: the public mirror of catalog records.
//!
//! A surface publishes a record as a post and hands back an opaque
//! [`ExternalRef`]. Calls are remote and are never transactional with the
//! record store.

pub mod caption;
pub mod memory;
pub mod telegram;

pub use caption::render_caption;
pub use memory::{MemoryDisplay, SurfaceOp};
pub use telegram::TelegramSurface;

use crate::catalog::{CatalogRecord, ExternalRef};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    /// The referenced post no longer exists
    #[error("post not found: {0}")]
    NotFound(String),

    /// The surface answered but refused the request
    #[error("rejected by display surface: {0}")]
    Rejected(String),

    #[error("display surface unreachable: {0}")]
    Transport(String),

    /// A replace removed the old post but could not publish the new one
    #[error("old post retracted, replacement not published: {0}")]
    ReplacementFailed(Box<DisplayError>),
}

impl From<reqwest::Error> for DisplayError {
    fn from(err: reqwest::Error) -> Self {
        DisplayError::Transport(err.to_string())
    }
}

pub type DisplayResult<T> = Result<T, DisplayError>;

#[async_trait]
pub trait DisplaySurface: Send + Sync {
    /// Publish a record and return the reference of the new post
    async fn publish(&self, record: &CatalogRecord) -> DisplayResult<ExternalRef>;

    async fn retract(&self, external_ref: &ExternalRef) -> DisplayResult<()>;

    async fn edit_caption(&self, external_ref: &ExternalRef, caption: &str) -> DisplayResult<()>;

    /// Swap the visual payload of a post. Images cannot be edited in place,
    /// so this retracts the old post and publishes a new one. A post that is
    /// already gone does not stop the publish.
    ///
    /// Any error other than `ReplacementFailed` leaves the old post live;
    /// `ReplacementFailed` means no post exists for the record any more.
    async fn replace(
        &self,
        old_ref: &ExternalRef,
        record: &CatalogRecord,
    ) -> DisplayResult<ExternalRef> {
        match self.retract(old_ref).await {
            Ok(()) => {}
            Err(DisplayError::NotFound(_)) => {
                debug!("Post {} already gone, publishing replacement", old_ref);
            }
            Err(e) => return Err(e),
        }
        self.publish(record)
            .await
            .map_err(|e| DisplayError::ReplacementFailed(Box::new(e)))
    }
}
