//! # Connection Acceptor
//!
//! Accepts TCP clients and hands each one to its own handler task with a
//! fresh entity id. Ids start at 1 and are never reused within a run.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time;
use tracing::{debug, info, warn};
use zappy_core::{EntityId, World};

use super::connection::handle_connection;
use super::ServerError;

/// Pause after a failed accept.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Listening socket plus the id counter.
#[derive(Debug)]
pub struct Acceptor {
    listener: TcpListener,
    next_id: u64,
}

impl Acceptor {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is unavailable.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self {
            listener,
            next_id: 1,
        })
    }

    /// The bound address (useful after binding port 0).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the socket cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Accepts clients forever.
    pub async fn run(mut self, world: Arc<World>) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let id = self.allocate_id();
                    if let Err(error) = stream.set_nodelay(true) {
                        debug!(entity = id.0, %error, "set_nodelay failed");
                    }
                    info!(entity = id.0, %peer, "client connected");

                    let world = Arc::clone(&world);
                    tokio::spawn(async move {
                        if let Err(error) = handle_connection(stream, id, world).await {
                            warn!(entity = id.0, %peer, %error, "connection failed");
                        }
                    });
                }
                Err(error) => {
                    warn!(%error, "accept failed");
                    time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}
