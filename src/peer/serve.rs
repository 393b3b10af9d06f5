use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::MAX_WORKERS;
use crate::errors::SwarmError;
use crate::protocol::{read_frame, PeerRequest, PeerResponse, ProtocolError};
use crate::store::ChunkStore;
use crate::tracker::TrackerApi;

/// A seeding peer: serves ping and chunk-fetch requests from its local
/// chunk store, bounded by a fixed worker budget.
pub struct SeedNode {
    listener: TcpListener,
    advertised: SocketAddr,
    store: ChunkStore,
    workers: Arc<Semaphore>,
}

impl SeedNode {
    /// Binds the requested port (0 picks an ephemeral one). The advertised
    /// address substitutes loopback for an unspecified bind IP, since
    /// 0.0.0.0 is not dialable by other peers.
    pub async fn bind(port: u16, store: ChunkStore) -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        let mut advertised = listener.local_addr()?;
        if advertised.ip().is_unspecified() {
            advertised.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
        Ok(Self {
            listener,
            advertised,
            store,
            workers: Arc::new(Semaphore::new(MAX_WORKERS)),
        })
    }

    pub fn advertised_addr(&self) -> SocketAddr {
        self.advertised
    }

    /// Announces every chunk in the local store against this peer's
    /// address. Refuses to seed an empty store.
    pub async fn announce(&self, tracker: &dyn TrackerApi) -> Result<usize, SwarmError> {
        let chunk_hashes = self.store.list()?;
        if chunk_hashes.is_empty() {
            return Err(SwarmError::NothingToSeed);
        }
        let announced = tracker
            .register_chunks(self.advertised, &chunk_hashes)
            .await?;
        info!(
            "Announced {} of {} local chunks as {}",
            announced,
            chunk_hashes.len(),
            self.advertised
        );
        Ok(announced)
    }

    /// Accept loop. A worker slot is acquired before each accept, so a full
    /// budget back-pressures new connections instead of failing them. Each
    /// worker serves exactly one request and closes.
    pub async fn run(&self) -> io::Result<()> {
        loop {
            let permit = match Arc::clone(&self.workers).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Ok(()),
            };
            let (stream, remote) = self.listener.accept().await?;
            debug!("New connection from {}", remote);

            let store = self.store.clone();
            let workers = Arc::clone(&self.workers);
            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = handle_request(stream, store, workers).await {
                    warn!("Connection with {} failed: {}", remote, e);
                }
            });
        }
    }

    /// Waits until every in-flight worker has finished.
    pub async fn drain(&self) {
        let _ = self.workers.acquire_many(MAX_WORKERS as u32).await;
    }

    /// Removes this peer's address from every chunk on the tracker.
    pub async fn deannounce(&self, tracker: &dyn TrackerApi) -> Result<(), SwarmError> {
        tracker.deregister_peers(&[self.advertised]).await
    }
}

async fn handle_request(
    mut stream: TcpStream,
    store: ChunkStore,
    workers: Arc<Semaphore>,
) -> Result<(), ProtocolError> {
    let (tag, payload) = read_frame(&mut stream).await?;
    let response = match PeerRequest::deserialize(&tag, &payload) {
        Ok(PeerRequest::Ping) => {
            let active_workers = (MAX_WORKERS - workers.available_permits()) as u32;
            PeerResponse::Pong { active_workers }
        }
        Ok(PeerRequest::FetchChunk { chunk_hash }) => match store.load(&chunk_hash) {
            Ok(bytes) => {
                debug!("Serving chunk {}", chunk_hash);
                PeerResponse::Chunk(bytes)
            }
            Err(_) => PeerResponse::Error("Chunk unavailable on requested peer.".to_string()),
        },
        Err(e) => {
            warn!("Rejecting request: {}", e);
            PeerResponse::Error(e.to_string())
        }
    };
    response.write(&mut stream).await
}

/// Seeds until interrupted: announce, serve, then drain workers and
/// deannounce before returning.
pub async fn run_seed(
    tracker: &dyn TrackerApi,
    store: ChunkStore,
    port: u16,
) -> Result<(), SwarmError> {
    let node = SeedNode::bind(port, store).await?;
    node.announce(tracker).await?;
    println!("Seeding on {}.", node.advertised_addr());

    tokio::select! {
        result = node.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, draining in-flight workers");
        }
    }

    node.drain().await;
    node.deannounce(tracker).await?;
    info!("Deannounced {}", node.advertised_addr());
    Ok(())
}
