use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::{FETCH_TIMEOUT, MAX_WORKERS, PROBE_TIMEOUT};
use crate::errors::SwarmError;
use crate::peer::selection::choose_peer;
use crate::protocol::{PeerRequest, PeerResponse};
use crate::store::{verify_chunk, ChunkHash, ChunkStore};
use crate::tracker::TrackerApi;

enum FetchError {
    /// Connectivity failure, refusal, or timeout. The chunk never arrived.
    Missing,
    /// Bytes arrived but their digest does not match the chunk hash.
    Corrupt,
}

/// Downloads `file_name` into `dest_dir`, returning the written path.
///
/// Chunks are fetched by a pool of at most `MAX_WORKERS` concurrent workers,
/// each verifying and persisting its chunk. The output file is written only
/// after every worker has finished and every chunk has passed verification,
/// in the tracker's registered chunk order rather than arrival order.
pub async fn download_file(
    tracker: &dyn TrackerApi,
    store: &ChunkStore,
    dest_dir: &Path,
    file_name: &str,
) -> Result<PathBuf, SwarmError> {
    sanitize_file_name(file_name)?;

    let chunk_hashes = tracker.file_chunks(file_name).await?;
    if chunk_hashes.is_empty() {
        return Err(SwarmError::FileNotAvailable(file_name.to_string()));
    }
    info!("Resolved {} chunks for '{}'", chunk_hashes.len(), file_name);

    // Pick a seeder per chunk up front; a chunk with no live seeder fails
    // the whole download before anything is fetched.
    let mut assignments: Vec<(ChunkHash, SocketAddr)> = Vec::with_capacity(chunk_hashes.len());
    for hash in &chunk_hashes {
        let candidates = tracker.chunk_peers(hash).await?;
        if candidates.is_empty() {
            return Err(SwarmError::NoActiveSeeders(file_name.to_string()));
        }
        match choose_peer(&candidates, PROBE_TIMEOUT).await {
            Some(peer) => assignments.push((*hash, peer)),
            None => {
                warn!(
                    "All {} registered seeders of chunk {} are unreachable, deannouncing them",
                    candidates.len(),
                    hash
                );
                tracker.deregister_peers(&candidates).await?;
                return Err(SwarmError::NoActiveSeeders(file_name.to_string()));
            }
        }
    }

    let workers = Arc::new(Semaphore::new(MAX_WORKERS));
    let mut tasks = Vec::with_capacity(assignments.len());
    for (hash, peer) in assignments {
        let workers = Arc::clone(&workers);
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = match workers.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (hash, Err(FetchError::Missing)),
            };
            let bytes = match fetch_chunk(peer, &hash).await {
                Ok(bytes) => bytes,
                Err(e) => return (hash, Err(e)),
            };
            if !verify_chunk(&hash, &bytes) {
                warn!("Chunk {} from {} failed verification", hash, peer);
                return (hash, Err(FetchError::Corrupt));
            }
            if let Err(e) = store.persist(&hash, &bytes) {
                warn!("Could not persist chunk {}: {}", hash, e);
            }
            (hash, Ok(bytes))
        }));
    }

    // Join barrier: every worker reports exactly once.
    let mut session: HashMap<ChunkHash, Vec<u8>> = HashMap::with_capacity(chunk_hashes.len());
    let mut missing = 0usize;
    let mut corrupted: Option<ChunkHash> = None;
    for joined in futures::future::join_all(tasks).await {
        match joined {
            Ok((hash, Ok(bytes))) => {
                session.insert(hash, bytes);
            }
            Ok((hash, Err(FetchError::Corrupt))) => {
                corrupted.get_or_insert(hash);
            }
            Ok((_, Err(FetchError::Missing))) => missing += 1,
            Err(e) => {
                warn!("Chunk worker failed: {}", e);
                missing += 1;
            }
        }
    }

    if missing > 0 {
        return Err(SwarmError::DownloadIncomplete {
            missing,
            total: chunk_hashes.len(),
        });
    }
    if let Some(hash) = corrupted {
        return Err(SwarmError::IntegrityFailure(hash));
    }

    // Reassemble strictly in registered order. Nothing touches the
    // destination until every chunk is in hand.
    let mut ordered: Vec<&[u8]> = Vec::with_capacity(chunk_hashes.len());
    for hash in &chunk_hashes {
        ordered.push(
            session
                .get(hash)
                .ok_or(SwarmError::ChunkNotFound(*hash))?
                .as_slice(),
        );
    }

    fs::create_dir_all(dest_dir)?;
    let dest = dest_dir.join(file_name);
    let mut output = fs::File::create(&dest)?;
    for bytes in ordered {
        output.write_all(bytes)?;
    }
    output.flush()?;

    info!("Download of '{}' completed", file_name);
    Ok(dest)
}

async fn fetch_chunk(peer: SocketAddr, hash: &ChunkHash) -> Result<Vec<u8>, FetchError> {
    let request = PeerRequest::FetchChunk { chunk_hash: *hash };
    let exchange = async {
        let mut stream = TcpStream::connect(peer).await.ok()?;
        request.write(&mut stream).await.ok()?;
        PeerResponse::read(&mut stream).await.ok()
    };

    match timeout(FETCH_TIMEOUT, exchange).await {
        Ok(Some(PeerResponse::Chunk(bytes))) => Ok(bytes),
        Ok(Some(PeerResponse::Error(message))) => {
            warn!("Peer {} refused chunk {}: {}", peer, hash, message);
            Err(FetchError::Missing)
        }
        Ok(Some(PeerResponse::Pong { .. })) | Ok(None) => Err(FetchError::Missing),
        Err(_) => {
            warn!("Transfer of chunk {} from {} timed out", hash, peer);
            Err(FetchError::Missing)
        }
    }
}

// File names travel over the wire; never let one walk out of dest_dir.
fn sanitize_file_name(file_name: &str) -> Result<(), SwarmError> {
    let suspicious = file_name.is_empty()
        || file_name == "."
        || file_name == ".."
        || file_name.contains('/')
        || file_name.contains('\\');
    if suspicious {
        return Err(SwarmError::InvalidPath(PathBuf::from(file_name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_file_names_are_rejected() {
        assert!(sanitize_file_name("notes.txt").is_ok());
        for bad in ["", ".", "..", "a/b", "..\\evil"] {
            assert!(sanitize_file_name(bad).is_err(), "accepted '{}'", bad);
        }
    }
}
