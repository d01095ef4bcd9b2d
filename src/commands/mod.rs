//! # Commands Module
//!
//! The two long-running loops of a node:
//!
//! ## `listen`
//! Accepts inbound TCP connections:
//! - Spawns one task per connection
//! - Answers handshakes and decrypts incoming messages
//! - Prints received messages as `[from] body`
//!
//! ## `console`
//! Reads operator commands line by line:
//! - `/all` lists known peers
//! - `/connect <addr> [addr...]` exchanges keys
//! - `/me <addr> <text>` sends a direct message
//! - `/exit` stops the node
//! - anything else is broadcast to every peer

pub mod console;
pub mod listen;

use colored::Colorize;

/// Print a neutral status line for the operator.
pub fn system(message: &str) {
    println!("{} {}", "[system]".magenta(), message);
}

/// Print a success status line for the operator.
pub fn success(message: &str) {
    println!("{} {}", "[system]".green(), message);
}

/// Print a failure status line for the operator.
pub fn failure(message: &str) {
    println!("{} {}", "[system]".red(), message.red());
}

/// A line of operator output produced by a console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    System(String),
    Success(String),
    Failure(String),
    /// One entry of a peer listing, printed as `| addr`
    Peer(String),
}

impl Status {
    /// The uncoloured text of the line.
    pub fn text(&self) -> &str {
        match self {
            Status::System(text)
            | Status::Success(text)
            | Status::Failure(text)
            | Status::Peer(text) => text,
        }
    }

    pub fn print(&self) {
        match self {
            Status::System(text) => system(text),
            Status::Success(text) => success(text),
            Status::Failure(text) => failure(text),
            Status::Peer(addr) => println!("| {}", addr),
        }
    }
}
