//! In-process display surface
//!
//! Keeps posts in a map instead of a remote channel. Used for dry runs and as
//! a controllable surface in tests: any operation can be switched to fail.

use super::{render_caption, DisplayError, DisplayResult, DisplaySurface};
use crate::catalog::{CatalogRecord, ExternalRef};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceOp {
    Publish,
    Retract,
    EditCaption,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub image_url: String,
    pub caption: String,
}

#[derive(Debug, Default)]
pub struct MemoryDisplay {
    posts: DashMap<ExternalRef, Post>,
    next_id: AtomicU64,
    failing: Mutex<HashSet<SurfaceOp>>,
}

impl MemoryDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of `op` fail (or succeed again)
    pub fn set_failing(&self, op: SurfaceOp, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(op);
        } else {
            set.remove(&op);
        }
    }

    pub fn post(&self, external_ref: &ExternalRef) -> Option<Post> {
        self.posts.get(external_ref).map(|p| p.value().clone())
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    /// Drop a post behind the registry's back, as a channel admin might
    pub fn remove_post(&self, external_ref: &ExternalRef) -> bool {
        self.posts.remove(external_ref).is_some()
    }

    fn check(&self, op: SurfaceOp) -> DisplayResult<()> {
        if self.failing.lock().contains(&op) {
            return Err(DisplayError::Transport(format!("{:?} unavailable", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl DisplaySurface for MemoryDisplay {
    async fn publish(&self, record: &CatalogRecord) -> DisplayResult<ExternalRef> {
        self.check(SurfaceOp::Publish)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let external_ref = ExternalRef::new(id.to_string());
        self.posts.insert(
            external_ref.clone(),
            Post {
                image_url: record.image_url.clone(),
                caption: render_caption(record),
            },
        );
        debug!("Posted character {} as {}", record.id, external_ref);
        Ok(external_ref)
    }

    async fn retract(&self, external_ref: &ExternalRef) -> DisplayResult<()> {
        self.check(SurfaceOp::Retract)?;
        self.posts
            .remove(external_ref)
            .map(|_| ())
            .ok_or_else(|| DisplayError::NotFound(external_ref.to_string()))
    }

    async fn edit_caption(&self, external_ref: &ExternalRef, caption: &str) -> DisplayResult<()> {
        self.check(SurfaceOp::EditCaption)?;
        let mut post = self
            .posts
            .get_mut(external_ref)
            .ok_or_else(|| DisplayError::NotFound(external_ref.to_string()))?;
        post.caption = caption.to_string();
        Ok(())
    }
}
