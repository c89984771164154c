use std::net::{Ipv4Addr, SocketAddrV4};

use anyhow::Result;
use clap::Parser;
use gimlet::{
    config::Config,
    protocol,
    types::{PeerId, SwarmId},
    udp,
};
use tracing_subscriber::EnvFilter;

/// Gimlet — UDP NAT traversal peer.
///
/// Runs either as an ordinary peer punching toward its swarms, or (with
/// --serve) as a statically reachable introducer answering ping, intro and
/// join for everyone it hears from.
#[derive(Parser, Debug)]
#[command(name = "gimlet", version, about)]
struct Cli {
    /// Introducer endpoint(s), e.g. 1.0.0.1:3456.
    #[arg(long, env = "GIMLET_INTRODUCER", value_delimiter = ',')]
    introducer: Vec<SocketAddrV4>,

    /// Main UDP port.
    #[arg(long, default_value_t = protocol::LOCAL_PORT, env = "GIMLET_PORT")]
    port: u16,

    /// Reachability probe port.
    #[arg(long, default_value_t = protocol::TEST_PORT, env = "GIMLET_TEST_PORT")]
    test_port: u16,

    /// Serve introductions and joins for other peers.
    #[arg(long, env = "GIMLET_SERVE")]
    serve: bool,

    /// Swarm id(s) to join on startup.
    #[arg(long, env = "GIMLET_JOIN", value_delimiter = ',')]
    join: Vec<SwarmId>,

    /// Address to bind sockets on.
    #[arg(long, default_value = "0.0.0.0", env = "GIMLET_BIND")]
    bind: Ipv4Addr,

    /// Keepalive interval in milliseconds; 0 disables it.
    #[arg(long, default_value_t = protocol::KEEP_ALIVE_TIMEOUT, env = "GIMLET_KEEP_ALIVE")]
    keep_alive: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut cfg = Config::new(PeerId::generate(&mut rand::thread_rng()));
    cfg.introducers = cli.introducer;
    cfg.local_port = cli.port;
    cfg.test_port = cli.test_port;
    cfg.introducer = cli.serve;
    cfg.keep_alive = cli.keep_alive;
    cfg.seed = rand::random();

    udp::run(cfg, cli.bind, cli.join).await
}
