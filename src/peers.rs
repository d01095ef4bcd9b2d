//! In-memory peer bookkeeping.
//!
//! Neither structure locks on its own: both live inside [`SharedState`],
//! which the owning [`crate::identity::Identity`] guards with a single mutex.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use log::{debug, warn};
use rsa::RsaPublicKey;

use crate::utils::canonical_addr;

/// Known remote addresses, keyed by the local listen address they belong to
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<String, Vec<String>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        PeerRegistry::default()
    }

    /// Append addresses for `local` and deduplicate the whole list,
    /// keeping the first occurrence of each address.
    pub fn add_peers<S: AsRef<str>>(&mut self, local: &str, addrs: &[S]) {
        let entry = self.peers.entry(local.to_string()).or_default();
        entry.extend(
            addrs
                .iter()
                .map(|a| canonical_addr(a.as_ref()))
                .filter(|a| !a.is_empty()),
        );

        let deduped = dedup(entry);
        *entry = deduped;
    }

    /// Drop one address. Order of the remaining entries is not preserved.
    pub fn remove_peer(&mut self, local: &str, addr: &str) {
        if let Some(list) = self.peers.get_mut(local) {
            if let Some(idx) = list.iter().position(|a| a == addr) {
                list.swap_remove(idx);
                debug!("Evicted {} from the peer list of {}", addr, local);
            }
        }
    }

    /// Deduplicated snapshot of the peers of `local`; the deduplicated list
    /// is stored back.
    pub fn list_peers(&mut self, local: &str) -> Vec<String> {
        match self.peers.get_mut(local) {
            Some(list) => {
                let deduped = dedup(list);
                *list = deduped.clone();
                deduped
            }
            None => Vec::new(),
        }
    }

    pub fn contains(&self, local: &str, addr: &str) -> bool {
        self.peers
            .get(local)
            .map(|list| list.iter().any(|a| a == addr))
            .unwrap_or(false)
    }
}

fn dedup(list: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(list.len());
    list.iter()
        .filter(|a| seen.insert(*a))
        .cloned()
        .collect()
}

/// Public keys learned from completed handshakes, keyed by remote address
#[derive(Debug, Default)]
pub struct TrustStore {
    keys: HashMap<String, RsaPublicKey>,
}

impl TrustStore {
    pub fn new() -> Self {
        TrustStore::default()
    }

    /// Store the key for `addr`, returning the one it replaced.
    ///
    /// A different key for an already known address means the peer
    /// regenerated its identity; the newest key wins.
    pub fn insert(&mut self, addr: &str, key: RsaPublicKey) -> Option<RsaPublicKey> {
        match self.keys.entry(addr.to_string()) {
            Entry::Vacant(e) => {
                e.insert(key);
                None
            }
            Entry::Occupied(mut e) => {
                if *e.get() != key {
                    warn!("Public key for {} changed, replacing the stored key", addr);
                }
                Some(e.insert(key))
            }
        }
    }

    pub fn get(&self, addr: &str) -> Option<&RsaPublicKey> {
        self.keys.get(addr)
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.keys.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Everything the accept loop and the command loop share
#[derive(Debug, Default)]
pub struct SharedState {
    pub peers: PeerRegistry,
    pub trust: TrustStore,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cryptography::generate_keypair;

    const LOCAL: &str = "127.0.0.1:9000";

    #[test]
    fn test_add_peers_trims_and_dedups() {
        let mut registry = PeerRegistry::new();
        registry.add_peers(LOCAL, &["127.0.0.1:9001\r\n", " 127.0.0.1:9002", "127.0.0.1:9001", ""]);

        assert_eq!(registry.list_peers(LOCAL), vec!["127.0.0.1:9001", "127.0.0.1:9002"]);
    }

    #[test]
    fn test_add_peers_idempotent() {
        let set = ["127.0.0.1:9001", "127.0.0.1:9002", "127.0.0.1:9003"];
        let mut registry = PeerRegistry::new();

        registry.add_peers(LOCAL, &set);
        let once = registry.list_peers(LOCAL);
        registry.add_peers(LOCAL, &set);
        let twice = registry.list_peers(LOCAL);

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 3);
    }

    #[test]
    fn test_remove_peer_swaps_with_last() {
        let mut registry = PeerRegistry::new();
        registry.add_peers(LOCAL, &["a:1", "b:2", "c:3"]);
        registry.remove_peer(LOCAL, "a:1");

        assert_eq!(registry.list_peers(LOCAL), vec!["c:3", "b:2"]);
    }

    #[test]
    fn test_remove_absent_peer_is_noop() {
        let mut registry = PeerRegistry::new();
        registry.add_peers(LOCAL, &["a:1"]);
        registry.remove_peer(LOCAL, "z:9");
        registry.remove_peer("other:1", "a:1");

        assert_eq!(registry.list_peers(LOCAL), vec!["a:1"]);
    }

    #[test]
    fn test_registries_are_per_local_address() {
        let mut registry = PeerRegistry::new();
        registry.add_peers(LOCAL, &["a:1"]);

        assert!(registry.contains(LOCAL, "a:1"));
        assert!(!registry.contains("127.0.0.1:9500", "a:1"));
        assert!(registry.list_peers("127.0.0.1:9500").is_empty());
    }

    #[test]
    fn test_trust_store_replaces_rotated_key() {
        let (_, first) = generate_keypair(1024).unwrap();
        let (_, second) = generate_keypair(1024).unwrap();
        let mut trust = TrustStore::new();

        assert!(trust.insert("a:1", first.clone()).is_none());
        assert_eq!(trust.insert("a:1", second.clone()), Some(first));
        assert_eq!(trust.get("a:1"), Some(&second));
        assert_eq!(trust.len(), 1);
        assert!(!trust.contains("b:2"));
    }
}
