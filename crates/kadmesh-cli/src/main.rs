use anyhow::Context;
use clap::{Parser, Subcommand};
use kadmesh_core::{DiscoveryConfig, NodeAdvert, ParsedMessage, PeerDiscovery, DEFAULT_PORT};
use log::info;
use rand::RngCore;

#[derive(Parser)]
#[command(name = "kadmesh")]
#[command(about = "kadmesh LAN discovery and wire-codec tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Announce a service on the local link until interrupted.
    Publish {
        #[arg(long, default_value = "dht")]
        service: String,
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Transport port advertised to discovered peers.
        #[arg(long, default_value_t = 4222)]
        node_port: u16,
    },
    /// Listen for service announcements and print them.
    Discover {
        #[arg(long, default_value = "dht")]
        service: String,
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    /// Decode a hex-encoded DHT RPC datagram and print it.
    Decode { datagram: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Publish { service, port, node_port } => {
            let mut node_id = vec![0u8; 20];
            rand::thread_rng().fill_bytes(&mut node_id);
            info!("publishing {service} as node {} on udp port {port}", hex::encode(&node_id));

            let discovery = PeerDiscovery::with_handle(
                DiscoveryConfig { port },
                tokio::runtime::Handle::current(),
            );
            let advert = NodeAdvert { node_id, port: node_port };
            discovery.start_publish_typed(&service, &advert)?;

            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            discovery.stop();
        }
        Command::Discover { service, port } => {
            let discovery = PeerDiscovery::with_handle(
                DiscoveryConfig { port },
                tokio::runtime::Handle::current(),
            );
            discovery.start_discovery_typed::<NodeAdvert, _>(&service, |advert, from| {
                println!(
                    "{from} advertises node {} on port {}",
                    hex::encode(&advert.node_id),
                    advert.port
                );
            });
            info!("listening for {service} announcements on udp port {port}");

            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
            discovery.stop();
        }
        Command::Decode { datagram } => {
            let bytes = hex::decode(datagram.trim()).context("datagram is not valid hex")?;
            let message = ParsedMessage::from_bytes(&bytes)?;
            println!("{message:#?}");
        }
    }
    Ok(())
}
