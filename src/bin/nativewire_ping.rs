use std::{error::Error, time::Instant};

use clap::Parser;
use nativewire::{Client, ClientOptions};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address
    #[arg(default_value = "127.0.0.1:9000")]
    address: String,
    #[arg(long, default_value = "default")]
    user: String,
    #[arg(long, default_value = "")]
    password: String,
    #[arg(long, default_value = "default")]
    database: String,
    /// Number of pings to send
    #[arg(short, long, default_value_t = 1)]
    count: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let options = ClientOptions {
        user: cli.user,
        password: cli.password,
        database: cli.database,
        ..Default::default()
    };
    let mut client = Client::dial(cli.address.as_str(), options)?;
    println!("connected to {}", client.server_info());

    for i in 0..cli.count {
        let start = Instant::now();
        client.ping()?;
        println!("pong {i}: {:?}", start.elapsed());
    }
    Ok(())
}
