//! Wire protocol shared by the tracker and the peers.
//!
//! Every message is one frame on a fresh TCP connection: a big-endian `u32`
//! payload length, a 10 byte space-padded ASCII tag, then the payload.
//! Control payloads are UTF-8 text; `PPS_GETCK` carries raw chunk bytes.
//! Connections are single-request: one message in, one message out, close.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::CHUNK_SIZE;
use crate::store::ChunkHash;

/// Tag width on the wire: a 9 character token plus one space.
pub const TAG_SIZE: usize = 10;

/// Largest payload a frame may carry. A full chunk must fit.
pub const MAX_PAYLOAD: usize = CHUNK_SIZE;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown request type '{0}'.")]
    UnknownTag(String),

    #[error("Malformed {tag} payload: {detail}")]
    MalformedPayload { tag: &'static str, detail: String },

    #[error("Frame payload of {0} bytes exceeds the {MAX_PAYLOAD} byte limit")]
    Oversized(usize),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn encode_frame(tag: &str, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(ProtocolError::Oversized(payload.len()));
    }
    let mut frame = Vec::with_capacity(4 + TAG_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    let mut padded = [b' '; TAG_SIZE];
    padded[..tag.len()].copy_from_slice(tag.as_bytes());
    frame.extend_from_slice(&padded);
    frame.extend_from_slice(payload);
    Ok(frame)
}

pub async fn write_frame(
    stream: &mut TcpStream,
    tag: &str,
    payload: &[u8],
) -> Result<(), ProtocolError> {
    let frame = encode_frame(tag, payload)?;
    stream.write_all(&frame).await?;
    Ok(())
}

/// Reads one full frame, looping until the declared payload length is
/// satisfied. Returns the tag with its padding stripped.
pub async fn read_frame(stream: &mut TcpStream) -> Result<(String, Vec<u8>), ProtocolError> {
    let mut length_buf = [0u8; 4];
    stream.read_exact(&mut length_buf).await?;
    let payload_len = u32::from_be_bytes(length_buf) as usize;
    if payload_len > MAX_PAYLOAD {
        return Err(ProtocolError::Oversized(payload_len));
    }

    let mut tag_buf = [0u8; TAG_SIZE];
    stream.read_exact(&mut tag_buf).await?;
    let tag = String::from_utf8_lossy(&tag_buf).trim_end().to_string();

    let mut payload = vec![0u8; payload_len];
    stream.read_exact(&mut payload).await?;

    Ok((tag, payload))
}

fn payload_text(tag: &'static str, payload: &[u8]) -> Result<String, ProtocolError> {
    String::from_utf8(payload.to_vec()).map_err(|_| ProtocolError::MalformedPayload {
        tag,
        detail: "payload is not valid UTF-8".to_string(),
    })
}

fn parse_hash(tag: &'static str, token: &str) -> Result<ChunkHash, ProtocolError> {
    token
        .parse()
        .map_err(|detail| ProtocolError::MalformedPayload { tag, detail })
}

fn parse_addr(tag: &'static str, token: &str) -> Result<SocketAddr, ProtocolError> {
    token
        .parse()
        .map_err(|_| ProtocolError::MalformedPayload {
            tag,
            detail: format!("invalid peer address '{}'", token),
        })
}

fn parse_count(tag: &'static str, payload: &[u8]) -> Result<usize, ProtocolError> {
    let text = payload_text(tag, payload)?;
    text.trim()
        .parse()
        .map_err(|_| ProtocolError::MalformedPayload {
            tag,
            detail: format!("invalid count '{}'", text.trim()),
        })
}

fn join_tokens<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One `<file_name> [<seeders>]` entry of a `CSS_GETAF` reply. The seeder
/// count is the number of peers holding every chunk of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileListing {
    pub name: String,
    pub seeders: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerRequest {
    ListFiles,
    FileChunks {
        file_name: String,
    },
    ChunkPeers {
        chunk_hash: ChunkHash,
    },
    RegisterFile {
        file_name: String,
        chunk_hashes: Vec<ChunkHash>,
    },
    RegisterChunks {
        peer: SocketAddr,
        chunk_hashes: Vec<ChunkHash>,
    },
    DeregisterPeers {
        peers: Vec<SocketAddr>,
    },
    DeregisterChunks {
        peer: SocketAddr,
        chunk_hashes: Vec<ChunkHash>,
    },
}

impl TrackerRequest {
    fn serialize(&self) -> (&'static str, Vec<u8>) {
        match self {
            Self::ListFiles => ("CSQ_GETAF", Vec::new()),
            Self::FileChunks { file_name } => ("CSQ_GETFI", file_name.clone().into_bytes()),
            Self::ChunkPeers { chunk_hash } => {
                ("CSQ_GETCK", chunk_hash.to_string().into_bytes())
            }
            Self::RegisterFile {
                file_name,
                chunk_hashes,
            } => {
                let mut text = file_name.clone();
                for hash in chunk_hashes {
                    text.push(' ');
                    text.push_str(&hash.to_string());
                }
                ("CSQ_REGFI", text.into_bytes())
            }
            Self::RegisterChunks { peer, chunk_hashes } => {
                let mut text = peer.to_string();
                for hash in chunk_hashes {
                    text.push(' ');
                    text.push_str(&hash.to_string());
                }
                ("CSQ_REGCK", text.into_bytes())
            }
            Self::DeregisterPeers { peers } => ("CSQ_URGPR", join_tokens(peers).into_bytes()),
            Self::DeregisterChunks { peer, chunk_hashes } => {
                let mut text = peer.to_string();
                for hash in chunk_hashes {
                    text.push(' ');
                    text.push_str(&hash.to_string());
                }
                ("CSQ_URGCK", text.into_bytes())
            }
        }
    }

    pub fn deserialize(tag: &str, payload: &[u8]) -> Result<Self, ProtocolError> {
        match tag {
            "CSQ_GETAF" => Ok(Self::ListFiles),
            "CSQ_GETFI" => {
                let text = payload_text("CSQ_GETFI", payload)?;
                let file_name = text.trim().to_string();
                if file_name.is_empty() {
                    return Err(ProtocolError::MalformedPayload {
                        tag: "CSQ_GETFI",
                        detail: "missing file name".to_string(),
                    });
                }
                Ok(Self::FileChunks { file_name })
            }
            "CSQ_GETCK" => {
                let text = payload_text("CSQ_GETCK", payload)?;
                Ok(Self::ChunkPeers {
                    chunk_hash: parse_hash("CSQ_GETCK", text.trim())?,
                })
            }
            "CSQ_REGFI" => {
                let text = payload_text("CSQ_REGFI", payload)?;
                let mut tokens = text.split_whitespace();
                let file_name = tokens
                    .next()
                    .ok_or(ProtocolError::MalformedPayload {
                        tag: "CSQ_REGFI",
                        detail: "missing file name".to_string(),
                    })?
                    .to_string();
                let chunk_hashes = tokens
                    .map(|token| parse_hash("CSQ_REGFI", token))
                    .collect::<Result<_, _>>()?;
                Ok(Self::RegisterFile {
                    file_name,
                    chunk_hashes,
                })
            }
            "CSQ_REGCK" => {
                let text = payload_text("CSQ_REGCK", payload)?;
                let mut tokens = text.split_whitespace();
                let peer = parse_addr(
                    "CSQ_REGCK",
                    tokens.next().ok_or(ProtocolError::MalformedPayload {
                        tag: "CSQ_REGCK",
                        detail: "missing peer address".to_string(),
                    })?,
                )?;
                let chunk_hashes = tokens
                    .map(|token| parse_hash("CSQ_REGCK", token))
                    .collect::<Result<_, _>>()?;
                Ok(Self::RegisterChunks { peer, chunk_hashes })
            }
            "CSQ_URGPR" => {
                let text = payload_text("CSQ_URGPR", payload)?;
                let peers = text
                    .split_whitespace()
                    .map(|token| parse_addr("CSQ_URGPR", token))
                    .collect::<Result<_, _>>()?;
                Ok(Self::DeregisterPeers { peers })
            }
            "CSQ_URGCK" => {
                let text = payload_text("CSQ_URGCK", payload)?;
                let mut tokens = text.split_whitespace();
                let peer = parse_addr(
                    "CSQ_URGCK",
                    tokens.next().ok_or(ProtocolError::MalformedPayload {
                        tag: "CSQ_URGCK",
                        detail: "missing peer address".to_string(),
                    })?,
                )?;
                let chunk_hashes = tokens
                    .map(|token| parse_hash("CSQ_URGCK", token))
                    .collect::<Result<_, _>>()?;
                Ok(Self::DeregisterChunks { peer, chunk_hashes })
            }
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }

    pub async fn write(&self, stream: &mut TcpStream) -> Result<(), ProtocolError> {
        let (tag, payload) = self.serialize();
        write_frame(stream, tag, &payload).await
    }

    pub async fn read(stream: &mut TcpStream) -> Result<Self, ProtocolError> {
        let (tag, payload) = read_frame(stream).await?;
        Self::deserialize(&tag, &payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerResponse {
    Files(Vec<FileListing>),
    FileChunks(Vec<ChunkHash>),
    ChunkPeers(Vec<SocketAddr>),
    FileRegistered(usize),
    ChunksRegistered(usize),
    PeersDeregistered,
    ChunksDeregistered(usize),
    Error(String),
}

impl TrackerResponse {
    fn serialize(&self) -> (&'static str, Vec<u8>) {
        match self {
            Self::Files(listings) => {
                let text = listings
                    .iter()
                    .map(|listing| format!("{} [{}]", listing.name, listing.seeders))
                    .collect::<Vec<_>>()
                    .join(" ");
                ("CSS_GETAF", text.into_bytes())
            }
            Self::FileChunks(hashes) => ("CSS_GETFI", join_tokens(hashes).into_bytes()),
            Self::ChunkPeers(peers) => ("CSS_GETCK", join_tokens(peers).into_bytes()),
            Self::FileRegistered(count) => ("CSS_REGFI", count.to_string().into_bytes()),
            Self::ChunksRegistered(count) => ("CSS_REGCK", count.to_string().into_bytes()),
            Self::PeersDeregistered => ("CSS_URGPR", Vec::new()),
            Self::ChunksDeregistered(count) => ("CSS_URGCK", count.to_string().into_bytes()),
            Self::Error(message) => ("CSS_ERROR", message.clone().into_bytes()),
        }
    }

    pub fn deserialize(tag: &str, payload: &[u8]) -> Result<Self, ProtocolError> {
        match tag {
            "CSS_GETAF" => {
                let text = payload_text("CSS_GETAF", payload)?;
                let tokens: Vec<&str> = text.split_whitespace().collect();
                if tokens.len() % 2 != 0 {
                    return Err(ProtocolError::MalformedPayload {
                        tag: "CSS_GETAF",
                        detail: "expected <file_name> [<seeders>] pairs".to_string(),
                    });
                }
                let mut listings = Vec::with_capacity(tokens.len() / 2);
                for pair in tokens.chunks(2) {
                    let seeders = pair[1]
                        .strip_prefix('[')
                        .and_then(|t| t.strip_suffix(']'))
                        .and_then(|t| t.parse().ok())
                        .ok_or(ProtocolError::MalformedPayload {
                            tag: "CSS_GETAF",
                            detail: format!("invalid seeder count '{}'", pair[1]),
                        })?;
                    listings.push(FileListing {
                        name: pair[0].to_string(),
                        seeders,
                    });
                }
                Ok(Self::Files(listings))
            }
            "CSS_GETFI" => {
                let text = payload_text("CSS_GETFI", payload)?;
                let hashes = text
                    .split_whitespace()
                    .map(|token| parse_hash("CSS_GETFI", token))
                    .collect::<Result<_, _>>()?;
                Ok(Self::FileChunks(hashes))
            }
            "CSS_GETCK" => {
                let text = payload_text("CSS_GETCK", payload)?;
                let peers = text
                    .split_whitespace()
                    .map(|token| parse_addr("CSS_GETCK", token))
                    .collect::<Result<_, _>>()?;
                Ok(Self::ChunkPeers(peers))
            }
            "CSS_REGFI" => Ok(Self::FileRegistered(parse_count("CSS_REGFI", payload)?)),
            "CSS_REGCK" => Ok(Self::ChunksRegistered(parse_count("CSS_REGCK", payload)?)),
            "CSS_URGPR" => Ok(Self::PeersDeregistered),
            "CSS_URGCK" => Ok(Self::ChunksDeregistered(parse_count("CSS_URGCK", payload)?)),
            "CSS_ERROR" => Ok(Self::Error(payload_text("CSS_ERROR", payload)?)),
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }

    pub async fn write(&self, stream: &mut TcpStream) -> Result<(), ProtocolError> {
        let (tag, payload) = self.serialize();
        write_frame(stream, tag, &payload).await
    }

    pub async fn read(stream: &mut TcpStream) -> Result<Self, ProtocolError> {
        let (tag, payload) = read_frame(stream).await?;
        Self::deserialize(&tag, &payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerRequest {
    Ping,
    FetchChunk { chunk_hash: ChunkHash },
}

impl PeerRequest {
    fn serialize(&self) -> (&'static str, Vec<u8>) {
        match self {
            Self::Ping => ("PPQ_PPING", Vec::new()),
            Self::FetchChunk { chunk_hash } => {
                ("PPQ_GETCK", chunk_hash.to_string().into_bytes())
            }
        }
    }

    pub fn deserialize(tag: &str, payload: &[u8]) -> Result<Self, ProtocolError> {
        match tag {
            "PPQ_PPING" => Ok(Self::Ping),
            "PPQ_GETCK" => {
                let text = payload_text("PPQ_GETCK", payload)?;
                Ok(Self::FetchChunk {
                    chunk_hash: parse_hash("PPQ_GETCK", text.trim())?,
                })
            }
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }

    pub async fn write(&self, stream: &mut TcpStream) -> Result<(), ProtocolError> {
        let (tag, payload) = self.serialize();
        write_frame(stream, tag, &payload).await
    }

    pub async fn read(stream: &mut TcpStream) -> Result<Self, ProtocolError> {
        let (tag, payload) = read_frame(stream).await?;
        Self::deserialize(&tag, &payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerResponse {
    /// Load signal: how many workers the peer currently has busy.
    Pong { active_workers: u32 },
    /// Raw chunk bytes.
    Chunk(Vec<u8>),
    Error(String),
}

impl PeerResponse {
    fn serialize(&self) -> (&'static str, Vec<u8>) {
        match self {
            Self::Pong { active_workers } => {
                ("PPS_PPONG", active_workers.to_string().into_bytes())
            }
            Self::Chunk(bytes) => ("PPS_GETCK", bytes.clone()),
            Self::Error(message) => ("PPS_ERROR", message.clone().into_bytes()),
        }
    }

    pub fn deserialize(tag: &str, payload: &[u8]) -> Result<Self, ProtocolError> {
        match tag {
            "PPS_PPONG" => {
                let count = parse_count("PPS_PPONG", payload)?;
                Ok(Self::Pong {
                    active_workers: count as u32,
                })
            }
            "PPS_GETCK" => Ok(Self::Chunk(payload.to_vec())),
            "PPS_ERROR" => Ok(Self::Error(payload_text("PPS_ERROR", payload)?)),
            other => Err(ProtocolError::UnknownTag(other.to_string())),
        }
    }

    pub async fn write(&self, stream: &mut TcpStream) -> Result<(), ProtocolError> {
        let (tag, payload) = self.serialize();
        write_frame(stream, tag, &payload).await
    }

    pub async fn read(stream: &mut TcpStream) -> Result<Self, ProtocolError> {
        let (tag, payload) = read_frame(stream).await?;
        Self::deserialize(&tag, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::hash_chunk;
    use tokio::net::TcpListener;

    async fn stream_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted, connected) = tokio::join!(listener.accept(), TcpStream::connect(addr));
        (accepted.unwrap().0, connected.unwrap())
    }

    #[test]
    fn tag_is_padded_to_fixed_width() {
        let frame = encode_frame("CSQ_GETAF", b"").unwrap();
        assert_eq!(frame.len(), 4 + TAG_SIZE);
        assert_eq!(&frame[..4], &0u32.to_be_bytes());
        assert_eq!(&frame[4..4 + TAG_SIZE], b"CSQ_GETAF ");
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![0u8; MAX_PAYLOAD + 1];
        assert!(matches!(
            encode_frame("PPS_GETCK", &payload),
            Err(ProtocolError::Oversized(_))
        ));
    }

    #[tokio::test]
    async fn tracker_request_round_trips() {
        let (mut server, mut client) = stream_pair().await;

        let request = TrackerRequest::RegisterFile {
            file_name: "report.pdf".to_string(),
            chunk_hashes: vec![hash_chunk(b"one"), hash_chunk(b"two")],
        };
        request.write(&mut client).await.unwrap();

        let received = TrackerRequest::read(&mut server).await.unwrap();
        assert_eq!(received, request);
    }

    #[tokio::test]
    async fn tracker_response_round_trips() {
        let (mut server, mut client) = stream_pair().await;

        let response = TrackerResponse::Files(vec![
            FileListing {
                name: "a.txt".to_string(),
                seeders: 0,
            },
            FileListing {
                name: "b.bin".to_string(),
                seeders: 3,
            },
        ]);
        response.write(&mut server).await.unwrap();

        let received = TrackerResponse::read(&mut client).await.unwrap();
        assert_eq!(received, response);
    }

    #[tokio::test]
    async fn deregistration_requests_round_trip() {
        let (mut server, mut client) = stream_pair().await;

        let request = TrackerRequest::DeregisterPeers {
            peers: vec!["127.0.0.1:4000".parse().unwrap(), "127.0.0.1:4001".parse().unwrap()],
        };
        request.write(&mut client).await.unwrap();
        assert_eq!(TrackerRequest::read(&mut server).await.unwrap(), request);
    }

    #[tokio::test]
    async fn raw_chunk_bytes_survive_transport() {
        let (mut server, mut client) = stream_pair().await;

        let bytes: Vec<u8> = (0..CHUNK_SIZE).map(|i| (i % 256) as u8).collect();
        let sent = bytes.clone();
        // a full-size frame can outgrow the socket buffer, so write from
        // another task while this one drains it
        tokio::spawn(async move {
            PeerResponse::Chunk(sent).write(&mut server).await.unwrap();
        });

        match PeerResponse::read(&mut client).await.unwrap() {
            PeerResponse::Chunk(received) => assert_eq!(received, bytes),
            other => panic!("expected chunk bytes, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn pong_reports_worker_count() {
        let (mut server, mut client) = stream_pair().await;

        PeerResponse::Pong { active_workers: 5 }
            .write(&mut server)
            .await
            .unwrap();
        assert_eq!(
            PeerResponse::read(&mut client).await.unwrap(),
            PeerResponse::Pong { active_workers: 5 }
        );
    }

    #[tokio::test]
    async fn unknown_tag_is_surfaced_with_its_name() {
        let (mut server, mut client) = stream_pair().await;

        write_frame(&mut client, "CSQ_BOGUS", b"").await.unwrap();
        match TrackerRequest::read(&mut server).await {
            Err(ProtocolError::UnknownTag(tag)) => assert_eq!(tag, "CSQ_BOGUS"),
            other => panic!("expected unknown tag error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn error_response_round_trips() {
        let (mut server, mut client) = stream_pair().await;

        let response = TrackerResponse::Error("Unknown request type 'CSQ_BOGUS'.".to_string());
        response.write(&mut server).await.unwrap();
        assert_eq!(TrackerResponse::read(&mut client).await.unwrap(), response);
    }

    #[test]
    fn malformed_hash_payload_is_rejected() {
        let result = TrackerRequest::deserialize("CSQ_GETCK", b"not-a-hash");
        assert!(matches!(
            result,
            Err(ProtocolError::MalformedPayload { tag: "CSQ_GETCK", .. })
        ));
    }
}
