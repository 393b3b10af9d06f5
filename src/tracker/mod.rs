pub mod client;
pub mod registry;
pub mod server;

use std::net::SocketAddr;

use async_trait::async_trait;

pub use client::TcpTrackerClient;
pub use registry::Registry;
pub use server::TrackerServer;

use crate::errors::SwarmError;
use crate::protocol::FileListing;
use crate::store::ChunkHash;

/// The tracker operations the peer-side paths depend on. Implemented over
/// TCP by [`TcpTrackerClient`]; tests may substitute their own.
#[async_trait]
pub trait TrackerApi {
    async fn list_files(&self) -> Result<Vec<FileListing>, SwarmError>;

    /// Ordered chunk sequence for a file, empty if the tracker does not
    /// know the name.
    async fn file_chunks(&self, file_name: &str) -> Result<Vec<ChunkHash>, SwarmError>;

    /// Addresses currently registered as seeding the chunk.
    async fn chunk_peers(&self, chunk_hash: &ChunkHash) -> Result<Vec<SocketAddr>, SwarmError>;

    /// Registers a file and its chunk sequence; returns how many hashes the
    /// tracker accepted.
    async fn register_file(
        &self,
        file_name: &str,
        chunk_hashes: &[ChunkHash],
    ) -> Result<usize, SwarmError>;

    /// Announces `peer` as a seeder of the given chunks; returns how many
    /// associations the tracker actually recorded.
    async fn register_chunks(
        &self,
        peer: SocketAddr,
        chunk_hashes: &[ChunkHash],
    ) -> Result<usize, SwarmError>;

    /// Removes each peer from every chunk's seeder set.
    async fn deregister_peers(&self, peers: &[SocketAddr]) -> Result<(), SwarmError>;

    /// Removes one peer from the named chunks only; returns how many
    /// associations were removed.
    async fn deregister_chunks(
        &self,
        peer: SocketAddr,
        chunk_hashes: &[ChunkHash],
    ) -> Result<usize, SwarmError>;
}
