//! Client and group registry
//!
//! Holds `clientID -> ConnectionHandle` and `groupID -> members`. Every
//! member of a group is also a registered client; removing a client removes
//! it from every group, and empty groups are dropped.
//!
//! The registry is owned by the hub task and never shared.

use std::collections::{HashMap, HashSet};

use crate::connection::ConnectionHandle;
use crate::envelope::{ClientId, GroupId};
use crate::utils::{HubError, Result};

#[derive(Debug)]
struct ClientEntry {
    handle: ConnectionHandle,
    groups: HashSet<GroupId>,
}

#[derive(Debug, Default)]
pub struct Registry {
    clients: HashMap<ClientId, ClientEntry>,
    groups: HashMap<GroupId, HashSet<ClientId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: ConnectionHandle) -> Result<()> {
        if self.clients.contains_key(&handle.id) {
            return Err(HubError::DuplicateClient(handle.id));
        }
        self.clients.insert(
            handle.id.clone(),
            ClientEntry {
                handle,
                groups: HashSet::new(),
            },
        );
        Ok(())
    }

    /// Remove a client and cascade to its groups. `None` if it was not registered.
    pub fn remove(&mut self, client_id: &str) -> Option<ConnectionHandle> {
        let entry = self.clients.remove(client_id)?;
        for group in &entry.groups {
            if let Some(members) = self.groups.get_mut(group) {
                members.remove(client_id);
                if members.is_empty() {
                    self.groups.remove(group);
                }
            }
        }
        Some(entry.handle)
    }

    /// Add a member. Joining twice is a no-op.
    pub fn join(&mut self, client_id: &str, group: &str) -> Result<()> {
        let entry = self
            .clients
            .get_mut(client_id)
            .ok_or_else(|| HubError::UnknownClient(client_id.to_string()))?;
        entry.groups.insert(group.to_string());
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(client_id.to_string());
        Ok(())
    }

    /// Remove a member. Leaving a group the client is not in is a no-op.
    pub fn leave(&mut self, client_id: &str, group: &str) -> Result<()> {
        let entry = self
            .clients
            .get_mut(client_id)
            .ok_or_else(|| HubError::UnknownClient(client_id.to_string()))?;
        entry.groups.remove(group);
        if let Some(members) = self.groups.get_mut(group) {
            members.remove(client_id);
            if members.is_empty() {
                self.groups.remove(group);
            }
        }
        Ok(())
    }

    pub fn get(&self, client_id: &str) -> Option<&ConnectionHandle> {
        self.clients.get(client_id).map(|entry| &entry.handle)
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    pub fn handles(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.clients.values().map(|entry| &entry.handle)
    }

    pub fn members(&self, group: &str) -> impl Iterator<Item = &ConnectionHandle> {
        self.groups
            .get(group)
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(id))
    }

    pub fn groups_of(&self, client_id: &str) -> Option<&HashSet<GroupId>> {
        self.clients.get(client_id).map(|entry| &entry.groups)
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        self.clients.keys().cloned().collect()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}
