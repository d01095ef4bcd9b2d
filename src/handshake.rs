//! Outbound key exchange.
//!
//! One handshake is one TCP round trip: dial, send our [`Handshake`], read
//! the peer's [`Handshake`] back, record it, drop the connection. The inbound
//! side lives in [`crate::transport::handle_connection`].

use std::fmt;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::networking::{dial, read_envelope, write_envelope};
use crate::utils::Envelope;

/// Progress of a single handshake attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    Dialed,
    Accepted,
    KeySent,
    KeyReceived,
    Established,
    Aborted,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Idle => "idle",
            HandshakeState::Dialed => "dialed",
            HandshakeState::Accepted => "accepted",
            HandshakeState::KeySent => "key sent",
            HandshakeState::KeyReceived => "key received",
            HandshakeState::Established => "established",
            HandshakeState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Tracks and logs state transitions for one peer.
#[derive(Debug)]
pub(crate) struct HandshakeTrace<'a> {
    peer: &'a str,
    state: HandshakeState,
}

impl<'a> HandshakeTrace<'a> {
    pub(crate) fn new(peer: &'a str) -> Self {
        HandshakeTrace {
            peer,
            state: HandshakeState::Idle,
        }
    }

    pub(crate) fn advance(&mut self, next: HandshakeState) {
        debug!("Handshake with {}: {} -> {}", self.peer, self.state, next);
        self.state = next;
    }

    pub(crate) fn state(&self) -> HandshakeState {
        self.state
    }

    /// Mark the attempt aborted and pass the error through.
    pub(crate) fn abort(&mut self, err: Error) -> Error {
        self.advance(HandshakeState::Aborted);
        err
    }
}

/// Exchange public keys with `target`.
///
/// On success the peer's key is in the trust store and `target` is in the
/// registry. A dial failure evicts `target` and adds nothing. The lock is
/// only taken after all network I/O is done.
pub async fn handshake(identity: &Identity, target: &str) -> Result<HandshakeState> {
    let target = identity.ensure_not_self(target)?;
    let mut trace = HandshakeTrace::new(&target);

    let mut stream = match dial(&target).await {
        Ok(stream) => stream,
        Err(e) => {
            identity.remove_peer(&target);
            return Err(trace.abort(e));
        }
    };
    trace.advance(HandshakeState::Dialed);

    let ours = identity.handshake().map_err(|e| trace.abort(e))?;
    write_envelope(&mut stream, &target, &Envelope::Handshake(ours))
        .await
        .map_err(|e| trace.abort(e))?;
    trace.advance(HandshakeState::KeySent);

    let reply = match read_envelope(&mut stream, &target).await {
        Ok(Envelope::Handshake(reply)) => reply,
        Ok(Envelope::Message(_)) => {
            return Err(trace.abort(Error::Protocol(format!(
                "{} answered a handshake with a message",
                target
            ))))
        }
        Err(e) => return Err(trace.abort(e)),
    };
    let key = reply.decode_key().map_err(|e| trace.abort(e))?;
    trace.advance(HandshakeState::KeyReceived);

    // Sends look keys up by the dialled address, so that is the primary entry
    let announced = reply.address.trim();
    if announced == identity.listen_addr() {
        warn!("{} announced our own address, ignoring the alias", target);
    } else if !announced.is_empty() && announced != target {
        debug!("{} announces itself as {}", target, announced);
        identity.state().trust.insert(announced, key.clone());
    }
    identity.record_peer(&target, key);
    trace.advance(HandshakeState::Established);

    info!("Handshake with {} established", target);
    Ok(trace.state())
}

/// Handshake with every address in `addrs`, each attempt independent of the
/// others. Results come back in input order.
pub async fn connect<S: AsRef<str>>(
    identity: &Identity,
    addrs: &[S],
) -> Vec<(String, Result<HandshakeState>)> {
    let mut results = Vec::with_capacity(addrs.len());

    for addr in addrs {
        let addr = addr.as_ref().trim();
        if addr.is_empty() {
            continue;
        }

        let result = handshake(identity, addr).await;
        if let Err(e) = &result {
            warn!("Handshake with {} failed: {}", addr, e);
        }
        results.push((addr.to_string(), result));
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_abort_keeps_error() {
        let mut trace = HandshakeTrace::new("127.0.0.1:9001");
        trace.advance(HandshakeState::Dialed);

        let err = trace.abort(Error::Protocol("bad reply".to_string()));

        assert_eq!(trace.state(), HandshakeState::Aborted);
        assert!(matches!(err, Error::Protocol(ref m) if m == "bad reply"));
    }

    #[tokio::test]
    async fn test_self_handshake_never_dials() {
        let identity = Identity::generate("127.0.0.1:9000", 1024).unwrap();

        let result = handshake(&identity, "127.0.0.1:9000").await;

        assert!(matches!(result, Err(Error::SelfConnect(_))));
        assert!(identity.list_peers().is_empty());
    }

    #[tokio::test]
    async fn test_connect_skips_blank_addresses() {
        let identity = Identity::generate("127.0.0.1:9000", 1024).unwrap();

        let results = connect(&identity, &["", "  "]).await;

        assert!(results.is_empty());
    }
}
