use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mini_swarm::config;
use mini_swarm::peer::{download, serve, upload};
use mini_swarm::store::ChunkStore;
use mini_swarm::tracker::{TcpTrackerClient, TrackerApi};

#[derive(Parser, Debug)]
#[command(author, version, about = "Peer node for the mini-swarm file sharing network")]
struct Cli {
    /// User identification; selects the local chunk and download directories
    user: String,

    /// Tracker address
    #[arg(long, default_value_t = config::DEFAULT_TRACKER_ADDR)]
    tracker: SocketAddr,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a file by name
    Download { file_name: String },
    /// Split a file into chunks and register it with the tracker
    Upload { file_path: PathBuf },
    /// Serve local chunks to other peers until interrupted
    Seed {
        /// Port to listen on; 0 picks an ephemeral port
        #[arg(default_value_t = 0)]
        port: u16,
    },
    /// List files available on the tracker
    List,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let root = Path::new(".");

    // the core expects both trees to exist before it runs
    if let Err(e) = fs::create_dir_all(root.join("chunks"))
        .and_then(|_| fs::create_dir_all(root.join("downloads")))
    {
        eprintln!("Failed to prepare working directories: {}", e);
        process::exit(1);
    }

    let store = match ChunkStore::open(root, &cli.user) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to open chunk store: {}", e);
            process::exit(1);
        }
    };
    let tracker = TcpTrackerClient::new(cli.tracker);

    let result = match cli.command {
        Command::Download { file_name } => {
            let dest_dir = root.join("downloads").join(&cli.user);
            download::download_file(&tracker, &store, &dest_dir, &file_name)
                .await
                .map(|path| println!("Download completed: {}", path.display()))
        }
        Command::Upload { file_path } => {
            if !file_path.exists() {
                eprintln!("Invalid path to file: '{}'", file_path.display());
                process::exit(1);
            }
            upload::upload_file(&tracker, &store, &file_path)
                .await
                .map(|_| println!("Upload completed."))
        }
        Command::Seed { port } => serve::run_seed(&tracker, store, port).await,
        Command::List => tracker.list_files().await.map(|files| {
            if files.is_empty() {
                println!("No files available.");
                return;
            }
            for (index, listing) in files.iter().enumerate() {
                println!("({}) {} [{}]", index, listing.name, listing.seeders);
            }
            println!("\n**[n] number of peers seeding every chunk of the file");
        }),
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        process::exit(1);
    }
}
