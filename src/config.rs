use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Where peers look for the tracker unless told otherwise.
pub const DEFAULT_TRACKER_ADDR: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 7077);

/// Chunking boundary. Also the maximum wire payload, so a whole chunk fits
/// in a single frame.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Worker budget shared by the seeding accept loop and the download
/// dispatcher. Slot acquisition blocks when the budget is exhausted.
pub const MAX_WORKERS: usize = 8;

/// Bound on a single liveness probe (connect, ping, pong).
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on one chunk transfer from a peer.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on one tracker round-trip.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
