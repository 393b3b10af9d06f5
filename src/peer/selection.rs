use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::protocol::{PeerRequest, PeerResponse};

/// Pings one candidate and returns its self-reported load. Connect failure,
/// a non-pong reply, or blowing the deadline all disqualify the candidate;
/// there is no retry.
pub async fn probe_peer(addr: SocketAddr, deadline: Duration) -> Option<u32> {
    let exchange = async {
        let mut stream = TcpStream::connect(addr).await.ok()?;
        PeerRequest::Ping.write(&mut stream).await.ok()?;
        match PeerResponse::read(&mut stream).await.ok()? {
            PeerResponse::Pong { active_workers } => Some(active_workers),
            _ => None,
        }
    };

    match timeout(deadline, exchange).await {
        Ok(load) => load,
        Err(_) => {
            debug!("Probe of {} timed out", addr);
            None
        }
    }
}

/// Probes every candidate and picks the least-loaded responder; ties go to
/// the first minimum encountered in candidate order. Returns `None` when no
/// candidate answers, in which case the caller must treat the whole list as
/// stale and deannounce it.
pub async fn choose_peer(candidates: &[SocketAddr], deadline: Duration) -> Option<SocketAddr> {
    let mut best: Option<(SocketAddr, u32)> = None;
    for &addr in candidates {
        let Some(load) = probe_peer(addr, deadline).await else {
            debug!("Candidate {} is not answering", addr);
            continue;
        };
        debug!("Candidate {} reports load {}", addr, load);
        match best {
            Some((_, best_load)) if load >= best_load => {}
            _ => best = Some((addr, load)),
        }
    }
    best.map(|(addr, _)| addr)
}
