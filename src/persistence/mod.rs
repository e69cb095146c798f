//! The `persistence` module stores chat envelopes so clients can fetch
//! recent history when they reconnect.
//!
//! Persistence is best-effort: the hub hands envelopes to a background
//! persister task and never waits on the store, and a failed save is logged
//! and dropped. `NoopStore` is used when persistence is disabled; `SledStore`
//! keeps history in an embedded `sled` database.

pub mod sled_store;

pub use sled_store::SledStore;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::envelope::{Envelope, Scope};
use crate::utils::Result;

#[async_trait]
pub trait Store: Send + Sync {
    async fn save(&self, envelope: &Envelope) -> Result<()>;

    /// Up to `limit` most recent envelopes for `scope`, oldest first.
    async fn fetch_history(&self, scope: &Scope, limit: usize) -> Result<Vec<Envelope>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

#[async_trait]
impl Store for NoopStore {
    async fn save(&self, _envelope: &Envelope) -> Result<()> {
        Ok(())
    }

    async fn fetch_history(&self, _scope: &Scope, _limit: usize) -> Result<Vec<Envelope>> {
        Ok(Vec::new())
    }
}

/// Spawn the task that writes envelopes to `store`, returning its bounded queue.
pub fn spawn_persister(store: Arc<dyn Store>, capacity: usize) -> mpsc::Sender<Arc<Envelope>> {
    let (tx, mut rx) = mpsc::channel::<Arc<Envelope>>(capacity.max(1));
    tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            if let Err(e) = store.save(&envelope).await {
                warn!(id = %envelope.id, error = %e, "failed to persist envelope");
            }
        }
        debug!("persister stopped");
    });
    tx
}

#[cfg(test)]
mod tests;
