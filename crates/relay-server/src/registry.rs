//! Connection registry: identity → live connection.
//!
//! The registry is the only shared mutable state in the relay. Each identity
//! lives in one `DashMap` shard, so `put`/`remove`/`release` are atomic per
//! identity and readers never observe a half-written entry. Lookups return a
//! cloned [`RegistryEntry`]; callers send on the connection after the shard
//! lock has been released.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use relay_core::Role;
use tracing::debug;

use crate::websocket::connection::PeerConnection;

/// A registered identity and the connection that claimed it.
#[derive(Clone, Debug)]
pub struct RegistryEntry {
    /// The registered identity.
    pub identity: String,
    /// Role claimed at registration.
    pub role: Role,
    /// The connection currently holding the identity.
    pub connection: Arc<PeerConnection>,
}

/// Outcome of [`ConnectionRegistry::release`].
#[derive(Debug)]
pub enum Release {
    /// The identity was held by the releasing connection and is now gone.
    Removed(RegistryEntry),
    /// The identity has since been claimed by a different connection; left untouched.
    Superseded,
    /// No entry existed for the identity.
    Absent,
}

/// Concurrent identity → connection map.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: DashMap<String, RegistryEntry>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `identity`, replacing any existing entry (last write wins).
    ///
    /// Returns the displaced entry, if any.
    pub fn put(
        &self,
        identity: &str,
        role: Role,
        connection: Arc<PeerConnection>,
    ) -> Option<RegistryEntry> {
        let entry = RegistryEntry {
            identity: identity.to_owned(),
            role,
            connection,
        };
        let previous = self.entries.insert(identity.to_owned(), entry);
        debug!(
            identity,
            %role,
            replaced = previous.is_some(),
            registered = self.entries.len(),
            "identity registered"
        );
        previous
    }

    /// Look up an identity.
    pub fn get(&self, identity: &str) -> Option<RegistryEntry> {
        self.entries.get(identity).map(|entry| entry.value().clone())
    }

    /// Remove an identity regardless of which connection holds it.
    pub fn remove(&self, identity: &str) -> Option<RegistryEntry> {
        let removed = self.entries.remove(identity).map(|(_, entry)| entry);
        if removed.is_some() {
            debug!(identity, registered = self.entries.len(), "identity removed");
        }
        removed
    }

    /// Remove `identity` only if it is still held by `connection_id`.
    ///
    /// The check and the removal happen under the same shard lock.
    pub fn release(&self, identity: &str, connection_id: &str) -> Release {
        match self.entries.entry(identity.to_owned()) {
            Entry::Occupied(occupied) if occupied.get().connection.id == connection_id => {
                let (_, entry) = occupied.remove_entry();
                debug!(identity, connection_id, "identity released");
                Release::Removed(entry)
            }
            Entry::Occupied(_) => Release::Superseded,
            Entry::Vacant(_) => Release::Absent,
        }
    }

    /// Snapshot of registered identities, skipping those in `excluded`.
    pub fn list_identities_except(&self, excluded: &[&str]) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|identity| !excluded.contains(&identity.as_str()))
            .collect()
    }

    /// Snapshot of every entry.
    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of registered identities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no identity is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use relay_core::OWNER_IDENTITY;
    use tokio::sync::mpsc;

    fn make_connection(id: &str) -> (Arc<PeerConnection>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(PeerConnection::with_id(id.into(), tx)), rx)
    }

    #[test]
    fn put_then_get() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        assert!(registry.put("alice", Role::User, conn).is_none());

        let entry = registry.get("alice").unwrap();
        assert_eq!(entry.identity, "alice");
        assert_eq!(entry.role, Role::User);
        assert_eq!(entry.connection.id, "c1");
    }

    #[test]
    fn get_unknown_is_none() {
        let registry = ConnectionRegistry::new();
        assert!(registry.get("nobody").is_none());
    }

    #[test]
    fn last_write_wins() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx1) = make_connection("c1");
        let (c2, _rx2) = make_connection("c2");
        let (c3, _rx3) = make_connection("c3");

        assert!(registry.put("alice", Role::User, c1).is_none());
        let displaced = registry.put("alice", Role::Owner, c2).unwrap();
        assert_eq!(displaced.connection.id, "c1");
        let displaced = registry.put("alice", Role::User, c3).unwrap();
        assert_eq!(displaced.connection.id, "c2");

        let entry = registry.get("alice").unwrap();
        assert_eq!(entry.connection.id, "c3");
        assert_eq!(entry.role, Role::User);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_present_and_absent() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        let _ = registry.put("alice", Role::User, conn);

        assert!(registry.remove("alice").is_some());
        assert!(registry.get("alice").is_none());
        assert!(registry.remove("alice").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn release_by_holder_removes() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = make_connection("c1");
        let _ = registry.put("alice", Role::User, conn);

        assert_matches!(
            registry.release("alice", "c1"),
            Release::Removed(e) if e.identity == "alice"
        );
        assert!(registry.get("alice").is_none());
        assert_matches!(registry.release("alice", "c1"), Release::Absent);
    }

    #[test]
    fn release_by_stale_connection_is_superseded() {
        let registry = ConnectionRegistry::new();
        let (old, _rx1) = make_connection("old");
        let (new, _rx2) = make_connection("new");
        let _ = registry.put("alice", Role::User, old);
        let _ = registry.put("alice", Role::User, new);

        assert_matches!(registry.release("alice", "old"), Release::Superseded);
        assert_eq!(registry.get("alice").unwrap().connection.id, "new");
    }

    #[test]
    fn list_excludes_owner() {
        let registry = ConnectionRegistry::new();
        for (identity, role) in [
            ("alice", Role::User),
            (OWNER_IDENTITY, Role::Owner),
            ("bob", Role::User),
        ] {
            let (conn, _rx) = make_connection(identity);
            let _ = registry.put(identity, role, conn);
        }

        let mut users = registry.list_identities_except(&[OWNER_IDENTITY]);
        users.sort();
        assert_eq!(users, vec!["alice".to_owned(), "bob".to_owned()]);

        let mut all = registry.list_identities_except(&[]);
        all.sort();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn list_on_empty_registry() {
        let registry = ConnectionRegistry::new();
        assert!(registry.list_identities_except(&[OWNER_IDENTITY]).is_empty());
    }

    #[test]
    fn entries_and_clear() {
        let registry = ConnectionRegistry::new();
        let (c1, _rx1) = make_connection("c1");
        let (c2, _rx2) = make_connection("c2");
        let _ = registry.put("alice", Role::User, c1);
        let _ = registry.put("bob", Role::User, c2);
        assert_eq!(registry.entries().len(), 2);

        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.entries().is_empty());
    }

    #[test]
    fn concurrent_puts_leave_one_entry_per_identity() {
        let registry = Arc::new(ConnectionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let (tx, _rx) = mpsc::channel(1);
                        let conn = Arc::new(PeerConnection::with_id(format!("t{t}_{i}"), tx));
                        let _ = registry.put(&format!("user_{}", i % 10), Role::User, conn);
                        let _ = registry.get(&format!("user_{}", (i + 3) % 10));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 10);
        let mut identities = registry.list_identities_except(&[]);
        identities.sort();
        identities.dedup();
        assert_eq!(identities.len(), 10);
    }
}
