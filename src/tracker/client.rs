use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::TrackerApi;
use crate::config::REQUEST_TIMEOUT;
use crate::errors::SwarmError;
use crate::protocol::{FileListing, ProtocolError, TrackerRequest, TrackerResponse};
use crate::store::ChunkHash;

/// Talks to the tracker over TCP, one connection per request.
#[derive(Clone)]
pub struct TcpTrackerClient {
    addr: SocketAddr,
}

impl TcpTrackerClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn request(&self, request: TrackerRequest) -> Result<TrackerResponse, SwarmError> {
        let mut stream = TcpStream::connect(self.addr)
            .await
            .map_err(|_| SwarmError::TrackerUnreachable(self.addr))?;

        request.write(&mut stream).await?;
        debug!("Sent {:?} to tracker", request);

        let response = timeout(REQUEST_TIMEOUT, TrackerResponse::read(&mut stream))
            .await
            .map_err(|_| SwarmError::RequestTimeout(self.addr))??;

        // error replies are terminal for the whole operation
        if let TrackerResponse::Error(message) = response {
            return Err(SwarmError::Remote(message));
        }
        Ok(response)
    }
}

#[async_trait]
impl TrackerApi for TcpTrackerClient {
    async fn list_files(&self) -> Result<Vec<FileListing>, SwarmError> {
        match self.request(TrackerRequest::ListFiles).await? {
            TrackerResponse::Files(listings) => Ok(listings),
            other => Err(ProtocolError::UnexpectedResponse(format!("{:?}", other)).into()),
        }
    }

    async fn file_chunks(&self, file_name: &str) -> Result<Vec<ChunkHash>, SwarmError> {
        let request = TrackerRequest::FileChunks {
            file_name: file_name.to_string(),
        };
        match self.request(request).await? {
            TrackerResponse::FileChunks(hashes) => Ok(hashes),
            other => Err(ProtocolError::UnexpectedResponse(format!("{:?}", other)).into()),
        }
    }

    async fn chunk_peers(&self, chunk_hash: &ChunkHash) -> Result<Vec<SocketAddr>, SwarmError> {
        let request = TrackerRequest::ChunkPeers {
            chunk_hash: *chunk_hash,
        };
        match self.request(request).await? {
            TrackerResponse::ChunkPeers(peers) => Ok(peers),
            other => Err(ProtocolError::UnexpectedResponse(format!("{:?}", other)).into()),
        }
    }

    async fn register_file(
        &self,
        file_name: &str,
        chunk_hashes: &[ChunkHash],
    ) -> Result<usize, SwarmError> {
        let request = TrackerRequest::RegisterFile {
            file_name: file_name.to_string(),
            chunk_hashes: chunk_hashes.to_vec(),
        };
        match self.request(request).await? {
            TrackerResponse::FileRegistered(count) => Ok(count),
            other => Err(ProtocolError::UnexpectedResponse(format!("{:?}", other)).into()),
        }
    }

    async fn register_chunks(
        &self,
        peer: SocketAddr,
        chunk_hashes: &[ChunkHash],
    ) -> Result<usize, SwarmError> {
        let request = TrackerRequest::RegisterChunks {
            peer,
            chunk_hashes: chunk_hashes.to_vec(),
        };
        match self.request(request).await? {
            TrackerResponse::ChunksRegistered(count) => Ok(count),
            other => Err(ProtocolError::UnexpectedResponse(format!("{:?}", other)).into()),
        }
    }

    async fn deregister_peers(&self, peers: &[SocketAddr]) -> Result<(), SwarmError> {
        let request = TrackerRequest::DeregisterPeers {
            peers: peers.to_vec(),
        };
        match self.request(request).await? {
            TrackerResponse::PeersDeregistered => Ok(()),
            other => Err(ProtocolError::UnexpectedResponse(format!("{:?}", other)).into()),
        }
    }

    async fn deregister_chunks(
        &self,
        peer: SocketAddr,
        chunk_hashes: &[ChunkHash],
    ) -> Result<usize, SwarmError> {
        let request = TrackerRequest::DeregisterChunks {
            peer,
            chunk_hashes: chunk_hashes.to_vec(),
        };
        match self.request(request).await? {
            TrackerResponse::ChunksDeregistered(count) => Ok(count),
            other => Err(ProtocolError::UnexpectedResponse(format!("{:?}", other)).into()),
        }
    }
}
