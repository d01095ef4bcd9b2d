pub mod commands;
pub mod cryptography;
pub mod error;
pub mod handshake;
pub mod identity;
pub mod networking;
pub mod peers;
pub mod transport;
pub mod utils;

pub use error::{Error, Result};
pub use identity::Identity;

pub const DEFAULT_KEY_BITS: usize = 1024;
pub const MAX_FRAME_SIZE: usize = 64 * 1024;
