use std::sync::Arc;

use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::transport::{handle_connection, Incoming};

/// Bind the listener for `identity`'s own address.
pub async fn bind(identity: &Identity) -> Result<TcpListener> {
    let addr = identity.listen_addr();
    debug!("Attempting to bind to {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::network(addr, e))?;
    info!("Listening on {}", addr);
    Ok(listener)
}

/// Accept loop for the node.
///
/// # Architecture
/// - This task: accepts connections forever
/// - Connection tasks: one per inbound connection, no upper bound
///
/// A failing connection only ends its own task. A failed `accept` is logged
/// and the loop keeps going.
pub async fn run(identity: Arc<Identity>, listener: TcpListener) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };
        debug!("Spawning connection handler for {}", addr);

        tokio::spawn(serve_connection(Arc::clone(&identity), stream));
    }
}

async fn serve_connection(identity: Arc<Identity>, stream: TcpStream) {
    match handle_connection(&identity, stream).await {
        Ok(incoming @ Incoming::Message { .. }) => {
            if let Some(line) = incoming.display_line() {
                println!("{}", line);
            }
        }
        Ok(Incoming::Handshake { from }) => {
            info!("Exchanged keys with {}", from);
        }
        Err(e) => {
            warn!("Dropping inbound connection: {}", e);
        }
    }
}
