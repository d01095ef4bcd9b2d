//! Wire structs exchanged between nodes and small address helpers.
//! - Handshake: identity + public key of the sending node
//! - ChatMessage: from/to/body, body is ciphertext once on the wire
//! - Envelope: what actually crosses the socket, one per direction

use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Announces a node's listen address and public key
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub address: String,
    /// PKCS#1 DER encoded RSA public key
    pub public_key: Vec<u8>,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl Handshake {
    pub fn new(address: &str, public_key: &RsaPublicKey) -> Result<Self> {
        Ok(Handshake {
            address: address.to_string(),
            public_key: encode_public_key(public_key)?,
            timestamp: now_millis(),
        })
    }

    pub fn decode_key(&self) -> Result<RsaPublicKey> {
        decode_public_key(&self.public_key)
    }
}

/// A text message between two nodes
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub from: String,
    pub to: String,
    pub body: Vec<u8>,
}

/// Everything that goes over a connection, tagged by kind
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Handshake(Handshake),
    Message(ChatMessage),
}

pub fn encode_public_key(key: &RsaPublicKey) -> Result<Vec<u8>> {
    let der = key
        .to_pkcs1_der()
        .map_err(|e| Error::Protocol(format!("cannot encode public key: {}", e)))?;
    Ok(der.as_bytes().to_vec())
}

pub fn decode_public_key(bytes: &[u8]) -> Result<RsaPublicKey> {
    RsaPublicKey::from_pkcs1_der(bytes)
        .map_err(|e| Error::Protocol(format!("invalid public key: {}", e)))
}

/// Validate a `host:port` listen address and return its canonical form.
///
/// Exactly one colon, a non-empty host and a numeric port are required.
pub fn parse_listen_addr(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let mut parts = trimmed.split(':');

    match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(port), None) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(format!("{}:{}", host, port))
        }
        _ => Err(Error::Config(input.to_string())),
    }
}

/// Trim whitespace and line endings off an operator-supplied address
pub fn canonical_addr(addr: &str) -> String {
    addr.trim().to_string()
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cryptography::generate_keypair;

    #[test]
    fn test_parse_listen_addr_valid() {
        assert_eq!(parse_listen_addr("127.0.0.1:9000").unwrap(), "127.0.0.1:9000");
        assert_eq!(parse_listen_addr(" localhost:80\n").unwrap(), "localhost:80");
    }

    #[test]
    fn test_parse_listen_addr_invalid() {
        for bad in ["127.0.0.1", "a:b:c", ":9000", "host:", "host:port", "host:70000", ""] {
            assert!(
                matches!(parse_listen_addr(bad), Err(Error::Config(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_canonical_addr() {
        assert_eq!(canonical_addr("  127.0.0.1:9001\r\n"), "127.0.0.1:9001");
        assert_eq!(canonical_addr("127.0.0.1:9001"), "127.0.0.1:9001");
    }

    #[test]
    fn test_handshake_carries_public_key() {
        let (_, public) = generate_keypair(1024).unwrap();
        let handshake = Handshake::new("127.0.0.1:9000", &public).unwrap();

        assert_eq!(handshake.address, "127.0.0.1:9000");
        assert!(handshake.timestamp > 0);
        assert_eq!(handshake.decode_key().unwrap(), public);
    }

    #[test]
    fn test_envelope_kind_survives_bincode() {
        let message = Envelope::Message(ChatMessage {
            from: "127.0.0.1:9000".to_string(),
            to: "127.0.0.1:9001".to_string(),
            body: vec![1, 2, 3],
        });

        let bytes = bincode::serialize(&message).unwrap();
        let decoded: Envelope = bincode::deserialize(&bytes).unwrap();
        assert!(matches!(decoded, Envelope::Message(ref m) if m.body == vec![1, 2, 3]));
    }

    #[test]
    fn test_garbage_public_key_rejected() {
        assert!(matches!(decode_public_key(b"not a key"), Err(Error::Protocol(_))));
    }
}
