use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::registry::Registry;
use crate::protocol::{read_frame, ProtocolError, TrackerRequest, TrackerResponse};

/// The tracker service: one listener, one owned [`Registry`].
///
/// The accept loop is strictly sequential. A connection is fully read,
/// dispatched, and answered before the next accept, so registry mutations
/// never race and no locking is needed.
pub struct TrackerServer {
    listener: TcpListener,
    registry: Registry,
}

impl TrackerServer {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Tracker listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            registry: Registry::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(mut self) -> io::Result<()> {
        loop {
            let (mut stream, client_addr) = self.listener.accept().await?;
            debug!("New connection from {}", client_addr);
            if let Err(e) = Self::handle_client(&mut self.registry, &mut stream).await {
                warn!("Connection with {} failed: {}", client_addr, e);
            }
        }
    }

    async fn handle_client(
        registry: &mut Registry,
        stream: &mut TcpStream,
    ) -> Result<(), ProtocolError> {
        let (tag, payload) = read_frame(stream).await?;
        let response = match TrackerRequest::deserialize(&tag, &payload) {
            Ok(request) => {
                debug!("Received {}", tag);
                Self::dispatch(registry, request)
            }
            Err(e) => {
                warn!("Rejecting request: {}", e);
                TrackerResponse::Error(e.to_string())
            }
        };
        response.write(stream).await
    }

    fn dispatch(registry: &mut Registry, request: TrackerRequest) -> TrackerResponse {
        match request {
            TrackerRequest::ListFiles => TrackerResponse::Files(registry.list_files()),
            TrackerRequest::FileChunks { file_name } => {
                TrackerResponse::FileChunks(registry.file_chunks(&file_name))
            }
            TrackerRequest::ChunkPeers { chunk_hash } => {
                TrackerResponse::ChunkPeers(registry.chunk_peers(&chunk_hash))
            }
            TrackerRequest::RegisterFile {
                file_name,
                chunk_hashes,
            } => TrackerResponse::FileRegistered(
                registry.register_file(&file_name, &chunk_hashes),
            ),
            TrackerRequest::RegisterChunks { peer, chunk_hashes } => {
                TrackerResponse::ChunksRegistered(registry.register_chunks(peer, &chunk_hashes))
            }
            TrackerRequest::DeregisterPeers { peers } => {
                registry.deregister_peers(&peers);
                TrackerResponse::PeersDeregistered
            }
            TrackerRequest::DeregisterChunks { peer, chunk_hashes } => {
                TrackerResponse::ChunksDeregistered(
                    registry.deregister_chunks(peer, &chunk_hashes),
                )
            }
        }
    }
}
