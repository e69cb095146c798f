//! Store backed by `sled`
//!
//! Envelopes are kept in one `sled` tree per scope (`global`, `group:<id>`,
//! `direct:<id>`). Keys are the 8-byte big-endian time the store received
//! the envelope followed by an 8-byte id from `Db::generate_id`, so
//! iteration follows arrival order and two envelopes in the same
//! millisecond never collide. The envelope's own `timestamp` may come from
//! the client and is only kept inside the stored JSON.
//!
//! Configuration options supported:
//! - `ttl_seconds`: entries received longer ago than this are removed when
//!   history is read
//! - `max_messages_per_scope`: oldest entries are trimmed after each save
//!
//! sled calls block, so `Store` methods run them on the blocking pool.

use async_trait::async_trait;
use chrono::Utc;
use sled::{Db, Tree};

use super::Store;
use crate::envelope::message::now_millis;
use crate::envelope::{Envelope, Scope};
use crate::utils::{HubError, Result};

#[derive(Clone)]
pub struct SledStore {
    db: Db,
    ttl_seconds: Option<i64>,
    max_messages_per_scope: Option<usize>,
}

impl SledStore {
    pub fn open(
        path: &str,
        ttl_seconds: Option<i64>,
        max_messages_per_scope: Option<usize>,
    ) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            ttl_seconds,
            max_messages_per_scope,
        })
    }

    fn tree(&self, scope: &Scope) -> Result<Tree> {
        Ok(self.db.open_tree(scope.to_string())?)
    }

    fn key(&self, received_at: i64) -> Result<[u8; 16]> {
        // Receive times are never negative, so big-endian bytes sort numerically.
        let received_at = u64::try_from(received_at).unwrap_or(0);
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&received_at.to_be_bytes());
        key[8..].copy_from_slice(&self.db.generate_id()?.to_be_bytes());
        Ok(key)
    }

    fn trim(&self, tree: &Tree) -> Result<()> {
        if let Some(max) = self.max_messages_per_scope {
            while tree.len() > max {
                if tree.pop_min()?.is_none() {
                    break;
                }
            }
        }
        Ok(())
    }

    fn cleanup_expired(&self, tree: &Tree) -> Result<()> {
        let Some(ttl) = self.ttl_seconds else {
            return Ok(());
        };
        let cutoff = u64::try_from((Utc::now().timestamp() - ttl).saturating_mul(1000)).unwrap_or(0);
        let expired: Vec<_> = tree
            .iter()
            .keys()
            .filter_map(|key| key.ok())
            .take_while(|key| {
                key.len() == 16
                    && key[..8]
                        .try_into()
                        .map(|ts: [u8; 8]| u64::from_be_bytes(ts) < cutoff)
                        .unwrap_or(false)
            })
            .collect();
        for key in expired {
            tree.remove(key)?;
        }
        Ok(())
    }

    pub(crate) fn insert_at(&self, envelope: &Envelope, received_at: i64) -> Result<()> {
        let tree = self.tree(&envelope.scope)?;
        let serialized = serde_json::to_vec(envelope)?;
        tree.insert(self.key(received_at)?, serialized)?;
        self.trim(&tree)
    }

    fn history(&self, scope: &Scope, limit: usize) -> Result<Vec<Envelope>> {
        let tree = self.tree(scope)?;
        self.cleanup_expired(&tree)?;
        let mut newest_first: Vec<Envelope> = tree
            .iter()
            .values()
            .rev()
            .filter_map(|val| val.ok())
            .filter_map(|val| serde_json::from_slice(&val).ok())
            .take(limit)
            .collect();
        newest_first.reverse();
        Ok(newest_first)
    }
}

#[async_trait]
impl Store for SledStore {
    async fn save(&self, envelope: &Envelope) -> Result<()> {
        let store = self.clone();
        let envelope = envelope.clone();
        tokio::task::spawn_blocking(move || store.insert_at(&envelope, now_millis()))
            .await
            .map_err(|e| HubError::Store(format!("save task failed: {e}")))?
    }

    async fn fetch_history(&self, scope: &Scope, limit: usize) -> Result<Vec<Envelope>> {
        let store = self.clone();
        let scope = scope.clone();
        tokio::task::spawn_blocking(move || store.history(&scope, limit))
            .await
            .map_err(|e| HubError::Store(format!("history task failed: {e}")))?
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .field("ttl_seconds", &self.ttl_seconds)
            .field("max_messages_per_scope", &self.max_messages_per_scope)
            .finish()
    }
}
