use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::store::ChunkHash;

#[derive(Error, Debug)]
pub enum SwarmError {
    #[error("Could not connect to tracker at {0} - make sure it's running")]
    TrackerUnreachable(SocketAddr),

    #[error("Request to {0} timed out")]
    RequestTimeout(SocketAddr),

    #[error("Error from server: {0}")]
    Remote(String),

    #[error("File '{0}' not available.")]
    FileNotAvailable(String),

    #[error("No active peers seeding '{0}'.")]
    NoActiveSeeders(String),

    #[error("Missing {missing} of {total} chunks, download incomplete.")]
    DownloadIncomplete { missing: usize, total: usize },

    #[error("Integrity check failed for chunk {0}. Download compromised.")]
    IntegrityFailure(ChunkHash),

    #[error("Upload incomplete: tracker registered {registered} of {sent} chunks.")]
    UploadIncomplete { registered: usize, sent: usize },

    #[error("Chunk {0} not present in the local store")]
    ChunkNotFound(ChunkHash),

    #[error("No chunks to seed. Try uploading a file first.")]
    NothingToSeed,

    #[error("Invalid path to file: '{}'", .0.display())]
    InvalidPath(PathBuf),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
