use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::dispatcher::Dispatcher;
use server::facade::Server;
use server::network::NetworkServer;
use server::storage::MemoryStorage;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port of the length-framed binary protocol
    #[arg(short, long, default_value = "8765")]
    port: u16,

    /// Port of the newline-delimited JSON protocol
    #[arg(short, long, default_value = "8766")]
    json_port: u16,

    /// Name announced to clients
    #[arg(short, long, default_value = "stepnet")]
    name: String,

    /// Message sent to every user after login
    #[arg(long, default_value = "")]
    motd: String,

    /// Maximum number of simultaneous connections
    #[arg(short, long, default_value = "256")]
    max_connections: usize,

    /// Player count advertised in user lists
    #[arg(long, default_value = "255")]
    max_players: u8,

    /// Seconds between keepalive pings
    #[arg(long, default_value = "5")]
    ping_interval: u64,

    /// Seconds of silence before a client is dropped
    #[arg(long, default_value = "30")]
    idle_timeout: u64,

    /// Largest accepted frame or JSON line in bytes
    #[arg(long, default_value_t = shared::DEFAULT_MAX_FRAME_SIZE)]
    max_frame_size: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            binary_addr: format!("{}:{}", args.host, args.port),
            json_addr: format!("{}:{}", args.host, args.json_port),
            name: args.name,
            motd: args.motd,
            max_connections: args.max_connections,
            max_players: args.max_players,
            ping_interval: Duration::from_secs(args.ping_interval.max(1)),
            idle_timeout: Duration::from_secs(args.idle_timeout),
            max_frame_size: args.max_frame_size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ServerConfig::from(args);
    info!("Starting '{}'", config.name);

    let server = Arc::new(Server::new(config, Arc::new(MemoryStorage::new())));
    let dispatcher = Arc::new(Dispatcher::with_default_handlers());
    let network = NetworkServer::bind(server, dispatcher).await?;
    network.run().await?;

    Ok(())
}
