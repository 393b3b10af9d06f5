use std::path::{Path, PathBuf};

use tracing::info;

use crate::errors::SwarmError;
use crate::store::{hash_chunk, split_file, ChunkStore};
use crate::tracker::TrackerApi;

/// Splits `file_path`, registers the file with the tracker under its base
/// name, and persists every chunk into the local store.
///
/// If the tracker accepts fewer hashes than were sent the upload is
/// reported incomplete; no retransmission is attempted. The chunks are
/// persisted either way, so a later announce can still serve whatever the
/// tracker did record.
pub async fn upload_file(
    tracker: &dyn TrackerApi,
    store: &ChunkStore,
    file_path: &Path,
) -> Result<(), SwarmError> {
    let file_name = file_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| SwarmError::InvalidPath(PathBuf::from(file_path)))?;

    let chunks = split_file(file_path)?;
    let chunk_hashes: Vec<_> = chunks.iter().map(|chunk| hash_chunk(chunk)).collect();
    info!("Split '{}' into {} chunks", file_name, chunks.len());

    let registered = tracker.register_file(file_name, &chunk_hashes).await?;

    for (chunk, hash) in chunks.iter().zip(&chunk_hashes) {
        store.persist(hash, chunk)?;
    }

    if registered != chunk_hashes.len() {
        return Err(SwarmError::UploadIncomplete {
            registered,
            sent: chunk_hashes.len(),
        });
    }

    info!("Registered '{}' with the tracker", file_name);
    Ok(())
}
