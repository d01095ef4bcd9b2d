use log::{debug, info, warn};
use sha2::Sha256;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::cryptography::{decrypt, encrypt};
use crate::error::{Error, Result};
use crate::handshake::{handshake, HandshakeState, HandshakeTrace};
use crate::identity::Identity;
use crate::networking::{dial, read_envelope, write_envelope};
use crate::utils::{ChatMessage, Envelope, Handshake};

/// What an inbound connection turned out to carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A peer introduced itself; its key is now trusted.
    Handshake { from: String },
    /// A decrypted text message.
    Message { from: String, body: String },
}

impl Incoming {
    /// Operator-facing line for a received message, `[from] body`.
    pub fn display_line(&self) -> Option<String> {
        match self {
            Incoming::Message { from, body } => Some(format!("[{}] {}", from, body)),
            Incoming::Handshake { .. } => None,
        }
    }
}

/// Outcome of a fan-out send
#[derive(Debug, Default)]
pub struct Delivery {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, Error)>,
}

impl Delivery {
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty() && self.failed.is_empty()
    }
}

/// Encrypt and deliver one message over a fresh connection.
///
/// The plaintext message is bincode encoded, encrypted for the recipient and
/// wrapped in an outer message whose `from`/`to` stay readable. A dial
/// failure evicts the recipient. The connection is closed right after the
/// write, so a recipient that never answers cannot hold up the caller.
pub async fn send(identity: &Identity, message: &ChatMessage) -> Result<()> {
    let to = identity.ensure_not_self(&message.to)?;

    let mut stream = match dial(&to).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("{} is unreachable, removing it from the peer list", to);
            identity.remove_peer(&to);
            return Err(e);
        }
    };

    let recipient_key = identity.trusted_key(&to);
    if recipient_key.is_none() {
        warn!("No public key on record for {}", to);
    }
    let key = recipient_key.ok_or_else(|| Error::NoTrustKey(to.clone()))?;

    let inner = bincode::serialize(message)?;
    let ciphertext = encrypt::<Sha256>(&key, &inner)?;
    debug!(
        "Encrypted {} byte message for {} into {} bytes",
        inner.len(),
        to,
        ciphertext.len()
    );

    let envelope = Envelope::Message(ChatMessage {
        from: identity.listen_addr().to_string(),
        to: to.clone(),
        body: ciphertext,
    });
    write_envelope(&mut stream, &to, &envelope).await?;

    // Write once and hang up; the recipient's reply is not waited for
    if let Err(e) = stream.shutdown().await {
        debug!("Closing connection to {} failed: {}", to, e);
    }

    Ok(())
}

/// Send `text` to every known peer. Each recipient succeeds or fails on
/// its own; failures are logged and collected.
pub async fn broadcast(identity: &Identity, text: &str) -> Delivery {
    let mut delivery = Delivery::default();
    if text.is_empty() {
        return delivery;
    }

    let recipients = identity.list_peers();
    if recipients.is_empty() {
        info!("Broadcast skipped, no peers");
        return delivery;
    }

    for to in recipients {
        let message = ChatMessage {
            from: identity.listen_addr().to_string(),
            to: to.clone(),
            body: text.as_bytes().to_vec(),
        };

        match send(identity, &message).await {
            Ok(()) => delivery.delivered.push(to),
            Err(e) => {
                warn!("Sending to {} failed: {}", to, e);
                delivery.failed.push((to, e));
            }
        }
    }

    delivery
}

/// Send `text` to one address, handshaking first if its key is unknown.
pub async fn direct_message(identity: &Identity, addr: &str, text: &str) -> Result<()> {
    let to = identity.ensure_not_self(addr)?;

    if !identity.is_trusted(&to) {
        info!("No key for {}, handshaking first", to);
        handshake(identity, &to).await?;
    }

    let message = ChatMessage {
        from: identity.listen_addr().to_string(),
        to,
        body: text.as_bytes().to_vec(),
    };
    send(identity, &message).await
}

/// Serve one inbound connection.
///
/// Reads a single envelope. A handshake registers the sender and its key; a
/// message is decrypted with our private key. Either way our own handshake
/// is written back before the connection is dropped; after a message the
/// sender has usually hung up already, so a failed reply is only logged.
pub async fn handle_connection(identity: &Identity, mut stream: TcpStream) -> Result<Incoming> {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown peer".to_string());

    let incoming = match read_envelope(&mut stream, &peer).await? {
        Envelope::Handshake(theirs) => {
            let mut trace = HandshakeTrace::new(&peer);
            trace.advance(HandshakeState::Accepted);
            if theirs.address.trim().is_empty() {
                return Err(trace.abort(Error::Protocol(format!(
                    "{} sent a handshake without an address",
                    peer
                ))));
            }
            record_handshake(identity, &theirs);
            trace.advance(HandshakeState::KeyReceived);
            Incoming::Handshake {
                from: theirs.address,
            }
        }
        Envelope::Message(outer) => open_message(identity, outer)?,
    };

    let ours = identity.handshake()?;
    let reply = write_envelope(&mut stream, &peer, &Envelope::Handshake(ours)).await;
    match (&incoming, reply) {
        (_, Ok(())) => {}
        // Senders hang up after writing, so a lost reply is expected there
        (Incoming::Message { .. }, Err(e)) => debug!("No handshake reply to {}: {}", peer, e),
        (Incoming::Handshake { .. }, Err(e)) => return Err(e),
    }

    Ok(incoming)
}

fn record_handshake(identity: &Identity, handshake: &Handshake) {
    match handshake.decode_key() {
        Ok(key) => {
            let from = handshake.address.trim();
            if from == identity.listen_addr() {
                warn!("Ignoring handshake claiming our own address");
                return;
            }
            identity.record_peer(from, key);
            debug!("Recorded public key for {}", from);
        }
        Err(e) => warn!("Handshake from {} carried a bad key: {}", handshake.address, e),
    }
}

fn open_message(identity: &Identity, outer: ChatMessage) -> Result<Incoming> {
    let plaintext = decrypt::<Sha256>(identity.private_key(), &outer.body)?;
    let inner: ChatMessage = bincode::deserialize(&plaintext)
        .map_err(|e| Error::Protocol(format!("undecodable message from {}: {}", outer.from, e)))?;

    if inner.from != outer.from {
        debug!("Envelope sender {} differs from inner sender {}", outer.from, inner.from);
    }

    let from = outer.from.trim().to_string();
    if !from.is_empty() && from != identity.listen_addr() {
        identity.add_peers(&[from.as_str()]);
    }

    Ok(Incoming::Message {
        from,
        body: String::from_utf8_lossy(&inner.body).into_owned(),
    })
}
