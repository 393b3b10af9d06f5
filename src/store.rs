use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha1::{Digest, Sha1};

use crate::config::CHUNK_SIZE;
use crate::errors::SwarmError;

/// Content address of a chunk: the SHA-1 digest of its bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkHash([u8; 20]);

impl ChunkHash {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkHash({})", hex::encode(self.0))
    }
}

impl FromStr for ChunkHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| e.to_string())?;
        let digest: [u8; 20] = bytes
            .try_into()
            .map_err(|_| format!("expected a 20 byte digest, got '{}'", s))?;
        Ok(ChunkHash(digest))
    }
}

pub fn hash_chunk(data: &[u8]) -> ChunkHash {
    let mut hasher = Sha1::new();
    hasher.update(data);
    ChunkHash(hasher.finalize().into())
}

pub fn verify_chunk(expected: &ChunkHash, data: &[u8]) -> bool {
    hash_chunk(data) == *expected
}

/// Reads `path` sequentially into `CHUNK_SIZE` blocks; the last block may be
/// shorter. An empty file yields no chunks.
pub fn split_file(path: &Path) -> io::Result<Vec<Vec<u8>>> {
    let mut file = fs::File::open(path)?;
    let mut chunks = Vec::new();

    loop {
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut filled = 0;
        while filled < CHUNK_SIZE {
            let read = file.read(&mut chunk[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        if filled == 0 {
            break;
        }
        chunk.truncate(filled);
        chunks.push(chunk);
        if filled < CHUNK_SIZE {
            break;
        }
    }

    Ok(chunks)
}

/// On-disk pool of chunks one user can serve, keyed by chunk hash.
/// Written by uploads (own chunks) and downloads (fetched chunks).
#[derive(Clone)]
pub struct ChunkStore {
    dir: PathBuf,
}

impl ChunkStore {
    /// Opens `root/chunks/<user>`, creating it if needed.
    pub fn open(root: &Path, user: &str) -> io::Result<Self> {
        let dir = root.join("chunks").join(user);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn persist(&self, hash: &ChunkHash, bytes: &[u8]) -> io::Result<()> {
        fs::write(self.dir.join(hash.to_string()), bytes)
    }

    pub fn load(&self, hash: &ChunkHash) -> Result<Vec<u8>, SwarmError> {
        match fs::read(self.dir.join(hash.to_string())) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(SwarmError::ChunkNotFound(*hash))
            }
            Err(e) => Err(SwarmError::Io(e)),
        }
    }

    pub fn contains(&self, hash: &ChunkHash) -> bool {
        self.dir.join(hash.to_string()).exists()
    }

    /// Every chunk hash held in this store. Entries whose names do not parse
    /// as hashes are skipped.
    pub fn list(&self) -> io::Result<Vec<ChunkHash>> {
        let mut hashes = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Ok(hash) = name.parse() {
                    hashes.push(hash);
                }
            }
        }
        Ok(hashes)
    }
}
