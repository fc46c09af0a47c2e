use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::debug;

use redbus::{args, Client, Config, EventBus};

#[derive(Parser, Debug)]
struct Args {
    /// Server host
    #[arg(long, default_value = "localhost")]
    host: String,
    /// Server port
    #[arg(short, long, default_value_t = 6379)]
    port: u16,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Fetch a key
    Get { key: String },
    /// Store a key
    Set { key: String, value: String },
    /// Print the server info map
    Info,
    /// Listen on a channel and print incoming messages
    Subscribe { channel: String },
}

#[tokio::main]
async fn main() -> redbus::Result<()> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let cli = Args::parse();
    let config = Config {
        host: cli.host,
        port: cli.port,
        ..Config::default()
    };

    let bus = Arc::new(EventBus::new());
    let client = Client::new(config, bus.clone());

    match cli.command {
        Cmd::Get { key } => {
            let value = client.send_text("get", args![key]).await?;
            match value {
                Some(value) => println!("{value}"),
                None => println!("(nil)"),
            }
        }
        Cmd::Set { key, value } => {
            client.send_void("set", args![key, value]).await?;
            println!("OK");
        }
        Cmd::Info => {
            let info = client.send_map("info", args![]).await?;
            println!("{info:#}");
        }
        Cmd::Subscribe { channel } => {
            let mut messages = bus.subscribe(&client.notification_address(&channel));
            client.send_void("subscribe", args![channel]).await?;
            while let Some(notification) = messages.recv().await {
                println!("{notification}");
            }
        }
    }

    client.stop().await
}
