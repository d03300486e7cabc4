//! Registry coordinator
//!
//! Drives create/update/delete across the sequence allocator, the record
//! store and the display surface. The store is the source of truth: once a
//! store write has succeeded it is never undone, and a display failure after
//! it only degrades the outcome to a partial success.
//!
//! ```text
//! Allocated -> Persisted -> { Mirrored <-> Updated (stale mirror) } -> Tombstoned
//! ```

use crate::catalog::{
    CatalogRecord, CharacterId, ExternalRef, FieldUpdate, NewCharacter, RecordField,
    CHARACTER_SEQUENCE,
};
use crate::display::{render_caption, DisplayError, DisplaySurface};
use crate::error::{RegistryError, RegistryResult};
use crate::probe::UrlProbe;
use crate::sequence::SequenceAllocator;
use crate::storage::RecordStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How the display mirror fared after the store write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MirrorStatus {
    /// The display surface matches the stored record
    Synced,
    /// The record has no mirror, so there was nothing to change
    Skipped,
    /// The store was updated but the display surface was not
    Failed { reason: String },
}

impl MirrorStatus {
    fn failed(reason: impl Into<String>) -> Self {
        MirrorStatus::Failed {
            reason: reason.into(),
        }
    }
}

/// Terminal result of a mutating operation that reached the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    /// Record as stored after the operation (for deletes, as it was removed)
    pub record: CatalogRecord,
    pub mirror: MirrorStatus,
}

impl Outcome {
    /// The store changed but the mirror is stale or missing
    pub fn is_partial(&self) -> bool {
        matches!(self.mirror, MirrorStatus::Failed { .. })
    }
}

pub struct RegistryCoordinator {
    sequences: Arc<dyn SequenceAllocator>,
    store: Arc<dyn RecordStore>,
    display: Arc<dyn DisplaySurface>,
    probe: Arc<dyn UrlProbe>,
}

impl RegistryCoordinator {
    pub fn new(
        sequences: Arc<dyn SequenceAllocator>,
        store: Arc<dyn RecordStore>,
        display: Arc<dyn DisplaySurface>,
        probe: Arc<dyn UrlProbe>,
    ) -> Self {
        Self {
            sequences,
            store,
            display,
            probe,
        }
    }

    pub async fn get(&self, id: &CharacterId) -> RegistryResult<CatalogRecord> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Register a new character and publish it.
    ///
    /// Validation runs before the allocator is touched, so a rejected upload
    /// never consumes an id. An id whose insert fails is burned, never reused.
    pub async fn create(&self, new: NewCharacter) -> RegistryResult<Outcome> {
        self.ensure_reachable(&new.image_url).await?;

        let value = self.sequences.allocate(CHARACTER_SEQUENCE).await?;
        let id = CharacterId::from_sequence(value);
        let mut record = new.into_record(id);

        if let Err(e) = self.store.insert(&record).await {
            warn!("Insert of character {} failed, id burned: {}", record.id, e);
            return Err(e.into());
        }
        info!(
            "Stored character {} ({} / {})",
            record.id, record.display_name, record.group_name
        );

        let mirror = self.publish_and_link(&mut record).await;
        Ok(Outcome { record, mirror })
    }

    /// Change one field of a character and bring its mirror along.
    pub async fn update(&self, id: &CharacterId, update: FieldUpdate) -> RegistryResult<Outcome> {
        if self.store.get(id).await?.is_none() {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        if let FieldUpdate::ImageUrl(url) = &update {
            self.ensure_reachable(url).await?;
        }

        let changes_visual = update.changes_visual();
        let field_name = update.field_name();
        let field = RecordField::from(update);

        // deleted between the check above and the write
        let previous = self
            .store
            .update_field(id, &field)
            .await?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let mut record = previous.with_applied(&field);
        info!("Updated {} of character {}", field_name, id);

        let mirror = if changes_visual {
            match previous.external_ref.clone() {
                Some(old_ref) => self.replace_and_link(&old_ref, &mut record).await,
                None => self.publish_and_link(&mut record).await,
            }
        } else {
            self.edit_caption(&mut record).await
        };

        Ok(Outcome { record, mirror })
    }

    /// Remove a character. Its mirror is retracted on a best-effort basis;
    /// a failed retraction never brings the record back.
    pub async fn delete(&self, id: &CharacterId) -> RegistryResult<Outcome> {
        let record = self
            .store
            .delete_by_id(id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        info!("Deleted character {}", id);

        let mirror = match &record.external_ref {
            None => MirrorStatus::Skipped,
            Some(ext) => match self.display.retract(ext).await {
                Ok(()) => MirrorStatus::Synced,
                Err(DisplayError::NotFound(_)) => {
                    debug!("Post {} of character {} was already gone", ext, id);
                    MirrorStatus::Synced
                }
                Err(e) => {
                    warn!("Failed to retract post {} of character {}: {}", ext, id, e);
                    MirrorStatus::failed(format!("deleted, but post {} is still shown: {}", ext, e))
                }
            },
        };

        Ok(Outcome { record, mirror })
    }

    /// Re-attempt mirroring of a stored record without changing its fields
    pub async fn resync(&self, id: &CharacterId) -> RegistryResult<Outcome> {
        let mut record = self.get(id).await?;
        let mirror = if record.is_mirrored() {
            let status = self.edit_caption(&mut record).await;
            match status {
                // the post vanished and its reference was cleared: publish afresh
                MirrorStatus::Failed { .. } if !record.is_mirrored() => {
                    self.publish_and_link(&mut record).await
                }
                status => status,
            }
        } else {
            self.publish_and_link(&mut record).await
        };
        Ok(Outcome { record, mirror })
    }

    async fn ensure_reachable(&self, url: &str) -> RegistryResult<()> {
        if self.probe.probe(url).await {
            Ok(())
        } else {
            Err(RegistryError::Validation(format!(
                "image URL is not reachable: {}",
                url
            )))
        }
    }

    /// Publish `record` and persist the returned reference into it
    async fn publish_and_link(&self, record: &mut CatalogRecord) -> MirrorStatus {
        match self.display.publish(record).await {
            Ok(ext) => self.link(record, ext).await,
            Err(e) => {
                warn!("Character {} saved but not shown: {}", record.id, e);
                MirrorStatus::failed(format!("saved, not shown: {}", e))
            }
        }
    }

    async fn replace_and_link(
        &self,
        old_ref: &ExternalRef,
        record: &mut CatalogRecord,
    ) -> MirrorStatus {
        match self.display.replace(old_ref, record).await {
            Ok(ext) => self.link(record, ext).await,
            Err(DisplayError::ReplacementFailed(e)) => {
                warn!(
                    "Character {}: post {} retracted but no replacement shown: {}",
                    record.id, old_ref, e
                );
                self.unlink(record).await;
                MirrorStatus::failed(format!("saved, old post removed, new image not shown: {}", e))
            }
            Err(e) => {
                warn!(
                    "Character {} saved but post {} not replaced: {}",
                    record.id, old_ref, e
                );
                MirrorStatus::failed(format!("saved, image not replaced on the channel: {}", e))
            }
        }
    }

    /// Store a freshly issued reference. If that write fails the new post
    /// would be unreachable from the catalog, so it is retracted again.
    async fn link(&self, record: &mut CatalogRecord, ext: ExternalRef) -> MirrorStatus {
        let field = RecordField::ExternalRef(Some(ext.clone()));
        let reason = match self.store.update_field(&record.id, &field).await {
            Ok(Some(_)) => {
                record.external_ref = Some(ext);
                return MirrorStatus::Synced;
            }
            Ok(None) => format!("character was removed while post {} was published", ext),
            Err(e) => format!("post {} published but its reference was not saved: {}", ext, e),
        };

        warn!("Character {}: {}", record.id, reason);
        record.external_ref = None;
        if let Err(e) = self.display.retract(&ext).await {
            warn!("Orphaned post {} could not be retracted: {}", ext, e);
        }
        MirrorStatus::failed(reason)
    }

    /// Drop the stored reference of a record whose post is gone
    async fn unlink(&self, record: &mut CatalogRecord) {
        match self
            .store
            .update_field(&record.id, &RecordField::ExternalRef(None))
            .await
        {
            Ok(_) => record.external_ref = None,
            Err(e) => warn!("Could not clear reference of {}: {}", record.id, e),
        }
    }

    async fn edit_caption(&self, record: &mut CatalogRecord) -> MirrorStatus {
        let Some(ext) = record.external_ref.clone() else {
            debug!("Character {} has no post to edit", record.id);
            return MirrorStatus::Skipped;
        };

        match self.display.edit_caption(&ext, &render_caption(record)).await {
            Ok(()) => MirrorStatus::Synced,
            Err(DisplayError::NotFound(_)) => {
                warn!("Post {} of character {} no longer exists", ext, record.id);
                self.unlink(record).await;
                MirrorStatus::failed(format!("saved, but post {} no longer exists", ext))
            }
            Err(e) => {
                warn!("Character {} saved but caption not edited: {}", record.id, e);
                MirrorStatus::failed(format!("saved, caption not updated on the channel: {}", e))
            }
        }
    }
}
