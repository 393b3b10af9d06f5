//! End-to-end scenarios: an in-process tracker, seeding peers, and
//! downloading peers talking over loopback TCP, each rooted in its own
//! scratch directory.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tempfile::{tempdir, TempDir};

use mini_swarm::config::CHUNK_SIZE;
use mini_swarm::errors::SwarmError;
use mini_swarm::peer::download::download_file;
use mini_swarm::peer::serve::SeedNode;
use mini_swarm::peer::upload::upload_file;
use mini_swarm::store::{hash_chunk, ChunkStore};
use mini_swarm::tracker::{TcpTrackerClient, TrackerApi, TrackerServer};

async fn start_tracker() -> TcpTrackerClient {
    let server = TrackerServer::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    TcpTrackerClient::new(addr)
}

async fn start_seeder(store: ChunkStore, tracker: &TcpTrackerClient) -> SocketAddr {
    let node = SeedNode::bind(0, store).await.unwrap();
    let addr = node.advertised_addr();
    node.announce(tracker).await.unwrap();
    let node = Arc::new(node);
    tokio::spawn(async move {
        let _ = node.run().await;
    });
    addr
}

fn pattern_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Writes a three-chunk source file under `root` and returns its path and
/// contents.
fn three_chunk_file(root: &Path, name: &str) -> (std::path::PathBuf, Vec<u8>) {
    let bytes = pattern_bytes(CHUNK_SIZE * 2 + 4096);
    let path = root.join(name);
    fs::write(&path, &bytes).unwrap();
    (path, bytes)
}

fn alice_store(root: &TempDir) -> ChunkStore {
    ChunkStore::open(root.path(), "alice").unwrap()
}

#[tokio::test]
async fn upload_is_listed_and_seeding_raises_the_count() {
    let tracker = start_tracker().await;
    let root = tempdir().unwrap();
    let store = alice_store(&root);
    let (path, _) = three_chunk_file(root.path(), "report.bin");

    upload_file(&tracker, &store, &path).await.unwrap();

    // registered but nobody seeds yet
    let files = tracker.list_files().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "report.bin");
    assert_eq!(files[0].seeders, 0);

    // announcing every chunk makes alice a complete seeder
    start_seeder(store, &tracker).await;
    let files = tracker.list_files().await.unwrap();
    assert_eq!(files[0].seeders, 1);
}

#[tokio::test]
async fn downloaded_file_matches_the_uploaded_bytes() {
    let tracker = start_tracker().await;

    let alice_root = tempdir().unwrap();
    let store = alice_store(&alice_root);
    let (path, original) = three_chunk_file(alice_root.path(), "dataset.bin");
    upload_file(&tracker, &store, &path).await.unwrap();
    start_seeder(store, &tracker).await;

    let bob_root = tempdir().unwrap();
    let bob_store = ChunkStore::open(bob_root.path(), "bob").unwrap();
    let dest_dir = bob_root.path().join("downloads").join("bob");

    let written = download_file(&tracker, &bob_store, &dest_dir, "dataset.bin")
        .await
        .unwrap();

    assert_eq!(fs::read(written).unwrap(), original);

    // bob now holds every chunk and could seed it himself
    for chunk in original.chunks(CHUNK_SIZE) {
        assert!(bob_store.contains(&hash_chunk(chunk)));
    }
}

#[tokio::test]
async fn unknown_file_is_not_available() {
    let tracker = start_tracker().await;
    let bob_root = tempdir().unwrap();
    let bob_store = ChunkStore::open(bob_root.path(), "bob").unwrap();
    let dest_dir = bob_root.path().join("downloads").join("bob");

    let err = download_file(&tracker, &bob_store, &dest_dir, "nope.bin")
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::FileNotAvailable(_)));
}

#[tokio::test]
async fn unreachable_seeders_are_deannounced_and_nothing_is_written() {
    let tracker = start_tracker().await;

    let alice_root = tempdir().unwrap();
    let store = alice_store(&alice_root);
    let (path, _) = three_chunk_file(alice_root.path(), "gone.bin");
    upload_file(&tracker, &store, &path).await.unwrap();

    // register alice at an address nothing listens on
    let dead_addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let hashes = store.list().unwrap();
    tracker.register_chunks(dead_addr, &hashes).await.unwrap();

    let bob_root = tempdir().unwrap();
    let bob_store = ChunkStore::open(bob_root.path(), "bob").unwrap();
    let dest_dir = bob_root.path().join("downloads").join("bob");

    let err = download_file(&tracker, &bob_store, &dest_dir, "gone.bin")
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::NoActiveSeeders(_)));
    assert!(!dest_dir.join("gone.bin").exists());

    // the stale address must be purged from every chunk
    for hash in &hashes {
        assert!(tracker.chunk_peers(hash).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn missing_chunk_on_the_seeder_fails_all_or_nothing() {
    let tracker = start_tracker().await;

    let alice_root = tempdir().unwrap();
    let store = alice_store(&alice_root);
    let (path, original) = three_chunk_file(alice_root.path(), "partial.bin");
    upload_file(&tracker, &store, &path).await.unwrap();
    start_seeder(store, &tracker).await;

    // one chunk vanishes from alice's pool after she announced it
    let victim = hash_chunk(&original[..CHUNK_SIZE]);
    fs::remove_file(
        alice_root
            .path()
            .join("chunks")
            .join("alice")
            .join(victim.to_string()),
    )
    .unwrap();

    let bob_root = tempdir().unwrap();
    let bob_store = ChunkStore::open(bob_root.path(), "bob").unwrap();
    let dest_dir = bob_root.path().join("downloads").join("bob");

    let err = download_file(&tracker, &bob_store, &dest_dir, "partial.bin")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SwarmError::DownloadIncomplete { missing: 1, total: 3 }
    ));
    assert!(!dest_dir.join("partial.bin").exists());
}

#[tokio::test]
async fn corrupted_chunk_fails_the_integrity_check_and_writes_nothing() {
    let tracker = start_tracker().await;

    let alice_root = tempdir().unwrap();
    let store = alice_store(&alice_root);
    let (path, original) = three_chunk_file(alice_root.path(), "tainted.bin");
    upload_file(&tracker, &store, &path).await.unwrap();
    start_seeder(store, &tracker).await;

    // corrupt one chunk in place; its hash on the tracker no longer matches
    let victim = hash_chunk(&original[CHUNK_SIZE..CHUNK_SIZE * 2]);
    fs::write(
        alice_root
            .path()
            .join("chunks")
            .join("alice")
            .join(victim.to_string()),
        b"garbage bytes",
    )
    .unwrap();

    let bob_root = tempdir().unwrap();
    let bob_store = ChunkStore::open(bob_root.path(), "bob").unwrap();
    let dest_dir = bob_root.path().join("downloads").join("bob");

    let err = download_file(&tracker, &bob_store, &dest_dir, "tainted.bin")
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::IntegrityFailure(h) if h == victim));
    assert!(!dest_dir.join("tainted.bin").exists());
}

#[tokio::test]
async fn upload_shorter_than_one_chunk_round_trips() {
    let tracker = start_tracker().await;

    let alice_root = tempdir().unwrap();
    let store = alice_store(&alice_root);
    let bytes = b"tiny payload".to_vec();
    let path = alice_root.path().join("tiny.txt");
    fs::write(&path, &bytes).unwrap();

    upload_file(&tracker, &store, &path).await.unwrap();
    start_seeder(store, &tracker).await;

    let bob_root = tempdir().unwrap();
    let bob_store = ChunkStore::open(bob_root.path(), "bob").unwrap();
    let dest_dir = bob_root.path().join("downloads").join("bob");

    let written = download_file(&tracker, &bob_store, &dest_dir, "tiny.txt")
        .await
        .unwrap();
    assert_eq!(fs::read(written).unwrap(), bytes);
}

#[tokio::test]
async fn seeding_an_empty_store_is_refused() {
    let tracker = start_tracker().await;
    let root = tempdir().unwrap();
    let store = ChunkStore::open(root.path(), "carol").unwrap();

    let node = SeedNode::bind(0, store).await.unwrap();
    assert!(matches!(
        node.announce(&tracker).await,
        Err(SwarmError::NothingToSeed)
    ));
}

#[tokio::test]
async fn deannounce_removes_the_seeder_from_listings() {
    let tracker = start_tracker().await;

    let alice_root = tempdir().unwrap();
    let store = alice_store(&alice_root);
    let (path, _) = three_chunk_file(alice_root.path(), "leaving.bin");
    upload_file(&tracker, &store, &path).await.unwrap();

    let node = SeedNode::bind(0, store).await.unwrap();
    node.announce(&tracker).await.unwrap();
    assert_eq!(tracker.list_files().await.unwrap()[0].seeders, 1);

    node.deannounce(&tracker).await.unwrap();
    assert_eq!(tracker.list_files().await.unwrap()[0].seeders, 0);
}
