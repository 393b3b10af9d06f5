use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use crate::protocol::FileListing;
use crate::store::ChunkHash;

/// Authoritative in-memory state of the tracker: which chunk sequence makes
/// up each file, and which peers claim to seed each chunk. Owned exclusively
/// by the service loop; mutations happen one request at a time.
///
/// Seeder membership is best-effort liveness information. A listed peer may
/// be long gone; downloaders probe at fetch time and deannounce the stale.
#[derive(Default)]
pub struct Registry {
    files: HashMap<String, Vec<ChunkHash>>,
    chunks: HashMap<ChunkHash, HashSet<SocketAddr>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every known file with its complete-seeder count: the number of peers
    /// present in the seeder set of every one of the file's chunks.
    pub fn list_files(&self) -> Vec<FileListing> {
        let mut listings: Vec<FileListing> = self
            .files
            .iter()
            .map(|(name, hashes)| FileListing {
                name: name.clone(),
                seeders: self.complete_seeders(hashes),
            })
            .collect();
        listings.sort_by(|a, b| a.name.cmp(&b.name));
        listings
    }

    fn complete_seeders(&self, hashes: &[ChunkHash]) -> usize {
        let Some((first, rest)) = hashes.split_first() else {
            return 0;
        };
        let Some(first_set) = self.chunks.get(first) else {
            return 0;
        };
        first_set
            .iter()
            .filter(|&peer| {
                rest.iter().all(|hash| {
                    self.chunks
                        .get(hash)
                        .map_or(false, |seeders| seeders.contains(peer))
                })
            })
            .count()
    }

    pub fn file_chunks(&self, file_name: &str) -> Vec<ChunkHash> {
        self.files.get(file_name).cloned().unwrap_or_default()
    }

    /// Seeders of one chunk, sorted so replies are stable.
    pub fn chunk_peers(&self, chunk_hash: &ChunkHash) -> Vec<SocketAddr> {
        let mut peers: Vec<SocketAddr> = self
            .chunks
            .get(chunk_hash)
            .map(|seeders| seeders.iter().copied().collect())
            .unwrap_or_default();
        peers.sort();
        peers
    }

    /// Last writer wins: a re-registration replaces the file's chunk
    /// sequence. Hashes not seen before get an empty seeder set; hashes
    /// already known keep the seeders they have.
    pub fn register_file(&mut self, file_name: &str, chunk_hashes: &[ChunkHash]) -> usize {
        self.files
            .insert(file_name.to_string(), chunk_hashes.to_vec());
        for hash in chunk_hashes {
            self.chunks.entry(*hash).or_default();
        }
        chunk_hashes.len()
    }

    /// Associates the peer with each hash the registry already knows.
    /// Hashes never introduced by a file registration are skipped and do
    /// not count.
    pub fn register_chunks(&mut self, peer: SocketAddr, chunk_hashes: &[ChunkHash]) -> usize {
        let mut count = 0;
        for hash in chunk_hashes {
            if let Some(seeders) = self.chunks.get_mut(hash) {
                seeders.insert(peer);
                count += 1;
            }
        }
        count
    }

    pub fn deregister_peers(&mut self, peers: &[SocketAddr]) {
        for seeders in self.chunks.values_mut() {
            for peer in peers {
                seeders.remove(peer);
            }
        }
    }

    pub fn deregister_chunks(&mut self, peer: SocketAddr, chunk_hashes: &[ChunkHash]) -> usize {
        let mut count = 0;
        for hash in chunk_hashes {
            if let Some(seeders) = self.chunks.get_mut(hash) {
                if seeders.remove(&peer) {
                    count += 1;
                }
            }
        }
        count
    }
}
