use std::io;

use thiserror::Error;

/// Errors produced by the node.
///
/// `Config` and `KeyGeneration` only happen at start-up and are fatal there.
/// Everything else is scoped to a single send, handshake or inbound
/// connection and is reported to the operator without stopping the node.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid listen address '{0}': expected host:port")]
    Config(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("network error with {addr}: {source}")]
    Network {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("no public key known for {0}")]
    NoTrustKey(String),

    #[error("encryption failed: {0}")]
    Encryption(#[from] rsa::Error),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("refusing to connect to own address {0}")]
    SelfConnect(String),
}

impl Error {
    pub fn network(addr: impl Into<String>, source: io::Error) -> Self {
        Error::Network {
            addr: addr.into(),
            source,
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
