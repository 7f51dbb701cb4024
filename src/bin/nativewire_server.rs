use std::{error::Error, net::SocketAddr};

use clap::Parser;
use log::info;
use nativewire::{
    Server, ServerOptions, Shutdown,
    compress::Method,
    protocol::Echo,
};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen for new connections at address
    #[arg(default_value = "127.0.0.1:9000")]
    address: SocketAddr,
    /// Number of connections served concurrently
    #[arg(long, default_value_t = 100)]
    workers: usize,
    /// Timezone announced in the handshake
    #[arg(long, default_value = "UTC")]
    timezone: String,
    /// Server name announced in the handshake
    #[arg(long, default_value = "nativewire")]
    name: String,
    /// Compress result blocks with zstd instead of lz4
    #[arg(long)]
    zstd: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("interrupted, draining connections");
        signal.cancel();
    })?;

    let options = ServerOptions {
        display_name: cli.name.clone(),
        name: cli.name,
        timezone: cli.timezone,
        workers: cli.workers,
        compression: if cli.zstd { Method::Zstd } else { Method::Lz4 },
        ..Default::default()
    };
    Server::new(options, Echo).listen(cli.address, &shutdown)?;
    Ok(())
}
