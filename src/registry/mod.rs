//! Bounded, insertion-ordered registry of server entries.
//!
//! The registry replaces a fixed-size sentinel-terminated array: capacity is
//! enforced at insert, iteration yields live entries in insertion order with
//! no gaps, and removal preserves the relative order of the survivors. No
//! call site has to know about sentinel slots.

pub mod entry;

pub use entry::{BOOTSTRAP_SSID, RetryParams, ServerEntry, UNDEFINED_LIFETIME};

use crate::error::{Error, RegResult};
use crate::state::Mode;
use std::fmt;
use tracing::debug;

/// Maximum number of entries a registry may hold at once.
pub const MAX_SERVERS: usize = 1024;

/// Stable identifier for a registry entry.
///
/// Handles are monotonic and never reused, so a handle held across a removal
/// can only ever miss, never alias a different entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Insertion-ordered collection of at most [`MAX_SERVERS`] server entries.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    entries: Vec<(Handle, ServerEntry)>,
    next_handle: u64,
}

impl ServerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert an entry at the end of the iteration order.
    ///
    /// Fails with [`Error::RegistryFull`] at capacity,
    /// [`Error::EmptyUri`] for an empty URI, and
    /// [`Error::DuplicateShortServerId`] when a non-bootstrap entry reuses a
    /// live operational SSID. The registry is unchanged on error.
    pub fn insert(&mut self, entry: ServerEntry) -> RegResult<Handle> {
        if self.entries.len() >= MAX_SERVERS {
            return Err(Error::RegistryFull);
        }
        if entry.uri().is_empty() {
            return Err(Error::EmptyUri);
        }
        if !entry.is_bootstrap() {
            if entry.ssid() == BOOTSTRAP_SSID || entry.ssid() == 0 {
                return Err(Error::Configuration(format!(
                    "short server id {} is reserved",
                    entry.ssid()
                )));
            }
            if self.find_by_short_id(entry.ssid()).is_some() {
                return Err(Error::DuplicateShortServerId(entry.ssid()));
            }
        }
        let handle = Handle(self.next_handle);
        self.next_handle += 1;
        debug!(
            handle = %handle,
            ssid = entry.ssid(),
            bootstrap = entry.is_bootstrap(),
            uri = %entry.uri(),
            "server entry inserted"
        );
        self.entries.push((handle, entry));
        Ok(handle)
    }

    /// Remove an entry, returning it. Relative order of the rest is kept.
    pub fn remove(&mut self, handle: Handle) -> RegResult<ServerEntry> {
        let pos = self
            .entries
            .iter()
            .position(|(h, _)| *h == handle)
            .ok_or(Error::NotFound)?;
        let (_, entry) = self.entries.remove(pos);
        debug!(handle = %handle, ssid = entry.ssid(), "server entry removed");
        Ok(entry)
    }

    /// Borrow an entry by handle.
    pub fn get(&self, handle: Handle) -> Option<&ServerEntry> {
        self.entries
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, e)| e)
    }

    /// Mutably borrow an entry by handle.
    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut ServerEntry> {
        self.entries
            .iter_mut()
            .find(|(h, _)| *h == handle)
            .map(|(_, e)| e)
    }

    /// Find the entry carrying the given Short Server ID.
    ///
    /// Bootstrap entries all carry [`BOOTSTRAP_SSID`], so looking that up
    /// returns the first bootstrap entry in insertion order.
    pub fn find_by_short_id(&self, ssid: u16) -> Option<Handle> {
        self.entries
            .iter()
            .find(|(_, e)| e.ssid() == ssid)
            .map(|(h, _)| *h)
    }

    /// Iterate live entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle, &ServerEntry)> {
        self.entries.iter().map(|(h, e)| (*h, e))
    }

    /// Iterate the entries selectable in the given mode, in insertion order.
    ///
    /// This is the sweep domain for the retry scheduler: bootstrap entries
    /// in bootstrap mode, operational entries otherwise.
    pub fn selectable(&self, mode: Mode) -> impl Iterator<Item = (Handle, &ServerEntry)> {
        let want_bootstrap = mode == Mode::Bootstrap;
        self.iter().filter(move |(_, e)| e.is_bootstrap() == want_bootstrap)
    }

    /// Handles of the selectable entries, in sweep order.
    pub fn selectable_handles(&self, mode: Mode) -> Vec<Handle> {
        self.selectable(mode).map(|(h, _)| h).collect()
    }

    /// Whether any bootstrap entry exists.
    pub fn has_bootstrap(&self) -> bool {
        self.entries.iter().any(|(_, e)| e.is_bootstrap())
    }

    /// Whether any operational entry exists.
    pub fn has_operational(&self) -> bool {
        self.entries.iter().any(|(_, e)| !e.is_bootstrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::CredentialStore;

    fn op(ssid: u16) -> ServerEntry {
        ServerEntry::operational(
            ssid,
            format!("coap://server-{ssid}.example.com"),
            CredentialStore::nosec(),
        )
    }

    #[test]
    fn test_insert_and_iterate_in_order() {
        let mut registry = ServerRegistry::new();
        for ssid in [5, 1, 9] {
            registry.insert(op(ssid)).unwrap();
        }
        let ssids: Vec<u16> = registry.iter().map(|(_, e)| e.ssid()).collect();
        assert_eq!(ssids, vec![5, 1, 9]);
    }

    #[test]
    fn test_insert_rejects_duplicate_ssid() {
        let mut registry = ServerRegistry::new();
        registry.insert(op(7)).unwrap();
        assert_eq!(
            registry.insert(op(7)).unwrap_err(),
            Error::DuplicateShortServerId(7)
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_bootstrap_entries_do_not_conflict() {
        let mut registry = ServerRegistry::new();
        registry
            .insert(ServerEntry::bootstrap("coaps://bs1", CredentialStore::nosec()))
            .unwrap();
        // A second bootstrap entry is allowed; both carry the sentinel SSID.
        registry
            .insert(ServerEntry::bootstrap("coaps://bs2", CredentialStore::nosec()))
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_insert_rejects_reserved_ssid_for_operational() {
        let mut registry = ServerRegistry::new();
        assert!(registry.insert(op(0)).is_err());
        assert!(registry.insert(op(BOOTSTRAP_SSID)).is_err());
    }

    #[test]
    fn test_insert_rejects_empty_uri() {
        let mut registry = ServerRegistry::new();
        let entry = ServerEntry::operational(1, "", CredentialStore::nosec());
        assert_eq!(registry.insert(entry).unwrap_err(), Error::EmptyUri);
    }

    #[test]
    fn test_remove_preserves_relative_order() {
        let mut registry = ServerRegistry::new();
        let handles: Vec<Handle> = (1..=4).map(|s| registry.insert(op(s)).unwrap()).collect();
        registry.remove(handles[1]).unwrap();
        let ssids: Vec<u16> = registry.iter().map(|(_, e)| e.ssid()).collect();
        assert_eq!(ssids, vec![1, 3, 4]);
    }

    #[test]
    fn test_remove_unknown_handle() {
        let mut registry = ServerRegistry::new();
        let handle = registry.insert(op(1)).unwrap();
        registry.remove(handle).unwrap();
        assert_eq!(registry.remove(handle).unwrap_err(), Error::NotFound);
    }

    #[test]
    fn test_handles_are_never_reused() {
        let mut registry = ServerRegistry::new();
        let first = registry.insert(op(1)).unwrap();
        registry.remove(first).unwrap();
        let second = registry.insert(op(1)).unwrap();
        assert_ne!(first, second);
        assert!(registry.get(first).is_none());
        assert!(registry.get(second).is_some());
    }

    #[test]
    fn test_selectable_filters_by_mode() {
        let mut registry = ServerRegistry::new();
        registry.insert(op(1)).unwrap();
        registry
            .insert(ServerEntry::bootstrap("coaps://bs", CredentialStore::nosec()))
            .unwrap();
        registry.insert(op(2)).unwrap();

        let operational: Vec<u16> = registry
            .selectable(Mode::Operational)
            .map(|(_, e)| e.ssid())
            .collect();
        assert_eq!(operational, vec![1, 2]);

        let bootstrap: Vec<u16> = registry
            .selectable(Mode::Bootstrap)
            .map(|(_, e)| e.ssid())
            .collect();
        assert_eq!(bootstrap, vec![BOOTSTRAP_SSID]);
    }

    #[test]
    fn test_capacity_limit_leaves_registry_unchanged() {
        let mut registry = ServerRegistry::new();
        for ssid in 1..=MAX_SERVERS as u16 {
            registry.insert(op(ssid)).unwrap();
        }
        assert_eq!(registry.len(), MAX_SERVERS);

        let before: Vec<Handle> = registry.iter().map(|(h, _)| h).collect();
        assert_eq!(
            registry.insert(op(2000)).unwrap_err(),
            Error::RegistryFull
        );
        let after: Vec<Handle> = registry.iter().map(|(h, _)| h).collect();
        assert_eq!(before, after);
        assert_eq!(registry.len(), MAX_SERVERS);
    }
}
