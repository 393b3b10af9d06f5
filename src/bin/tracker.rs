use std::net::SocketAddr;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mini_swarm::config;
use mini_swarm::tracker::TrackerServer;

#[derive(Parser, Debug)]
#[command(author, version, about = "Coordination tracker for the mini-swarm network")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value_t = config::DEFAULT_TRACKER_ADDR)]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let server = match TrackerServer::bind(cli.listen).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Failed to start tracker on {}: {}", cli.listen, e);
            process::exit(1);
        }
    };

    match server.local_addr() {
        Ok(addr) => println!("Listening on {}", addr),
        Err(e) => {
            eprintln!("Failed to start tracker on {}: {}", cli.listen, e);
            process::exit(1);
        }
    }

    if let Err(e) = server.run().await {
        eprintln!("Tracker stopped: {}", e);
        process::exit(1);
    }
}
