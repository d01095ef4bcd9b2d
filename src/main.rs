use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tokio::io::BufReader;

use peerline::commands::{self, console, listen};
use peerline::utils::parse_listen_addr;
use peerline::{Identity, DEFAULT_KEY_BITS};

#[derive(Parser)]
#[command(name = "peerline")]
#[command(about = "Peer-to-peer encrypted messaging node", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to listen on, as host:port
    address: String,

    /// RSA modulus size for this node's keypair
    #[arg(long, default_value_t = DEFAULT_KEY_BITS)]
    key_bits: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// The validated listen address, checked before any key is generated
    fn listen_addr(&self) -> peerline::Result<String> {
        parse_listen_addr(&self.address)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // Configure logging based on verbose flag
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let address = cli.listen_addr()?;

    commands::system("Generating keys.");
    let identity = Arc::new(Identity::generate(&address, cli.key_bits)?);
    commands::success("Keys were successfully generated.");

    let listener = listen::bind(&identity).await?;
    commands::system(&format!("Listening on {}", identity.listen_addr()));

    tokio::spawn(listen::run(Arc::clone(&identity), listener));

    let stdin = BufReader::new(tokio::io::stdin());
    console::run(identity, stdin).await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_address_is_rejected_up_front() {
        let cli = Cli::try_parse_from(["peerline", "9000"]).unwrap();
        assert!(matches!(cli.listen_addr(), Err(peerline::Error::Config(_))));

        let cli = Cli::try_parse_from(["peerline", " 127.0.0.1:9000 "]).unwrap();
        assert_eq!(cli.listen_addr().unwrap(), "127.0.0.1:9000");
    }
}
