use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::info;
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::cryptography::generate_keypair;
use crate::error::{Error, Result};
use crate::peers::SharedState;
use crate::utils::{canonical_addr, parse_listen_addr, Handshake};

/// A running node: its keypair, listen address, and the peer state shared by
/// the accept loop and the command loop.
///
/// The registry and trust store sit behind one mutex. Hold it only for
/// in-memory work; never across a dial, read or write.
pub struct Identity {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
    listen_addr: String,
    state: Mutex<SharedState>,
}

impl Identity {
    /// Validate `listen_addr` and generate a fresh keypair for it.
    pub fn generate(listen_addr: &str, modulus_bits: usize) -> Result<Self> {
        let listen_addr = parse_listen_addr(listen_addr)?;
        let (private_key, public_key) = generate_keypair(modulus_bits)?;
        info!("Generated identity for {}", listen_addr);

        Ok(Identity {
            private_key,
            public_key,
            listen_addr,
            state: Mutex::new(SharedState::default()),
        })
    }

    pub fn listen_addr(&self) -> &str {
        &self.listen_addr
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub(crate) fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// A fresh handshake announcing this node.
    pub fn handshake(&self) -> Result<Handshake> {
        Handshake::new(&self.listen_addr, &self.public_key)
    }

    /// Lock the shared state. A poisoned lock is recovered, since every
    /// critical section leaves the state consistent.
    pub fn state(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject `target` when it points back at this node.
    pub fn ensure_not_self(&self, target: &str) -> Result<String> {
        let target = canonical_addr(target);
        if target == self.listen_addr {
            return Err(Error::SelfConnect(target));
        }
        Ok(target)
    }

    pub fn add_peers<S: AsRef<str>>(&self, addrs: &[S]) {
        self.state().peers.add_peers(&self.listen_addr, addrs);
    }

    pub fn remove_peer(&self, addr: &str) {
        self.state().peers.remove_peer(&self.listen_addr, addr);
    }

    pub fn list_peers(&self) -> Vec<String> {
        self.state().peers.list_peers(&self.listen_addr)
    }

    pub fn has_peer(&self, addr: &str) -> bool {
        self.state().peers.contains(&self.listen_addr, addr)
    }

    pub fn trusted_key(&self, addr: &str) -> Option<RsaPublicKey> {
        self.state().trust.get(addr).cloned()
    }

    pub fn is_trusted(&self, addr: &str) -> bool {
        self.state().trust.contains(addr)
    }

    /// Record a peer learned from a handshake: its key goes into the trust
    /// store and its address joins the registry, under one lock.
    pub fn record_peer(&self, addr: &str, key: RsaPublicKey) {
        let mut state = self.state();
        state.trust.insert(addr, key);
        state.peers.add_peers(&self.listen_addr, &[addr]);
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("listen_addr", &self.listen_addr)
            .finish_non_exhaustive()
    }
}
