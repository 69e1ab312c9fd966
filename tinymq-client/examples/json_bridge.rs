//! Bridges line-delimited JSON into TinyMQ publishes.
//!
//! Listens on a local TCP port for lines like
//! `{"topic": "weather", "data": "72F"}` and republishes each one to the
//! broker. Useful for devices that can open a socket but do not speak the
//! packet protocol.

use flexi_logger::{colored_opt_format, Logger};
use serde::Deserialize;
use tinymq_client::Client;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;

const BRIDGE_PORT: u16 = 12345;

#[derive(Deserialize)]
struct BridgeLine {
    topic: String,
    data: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    Logger::try_with_str("info")?
        .format(colored_opt_format)
        .start()?;

    let mut client = Client::new("bridge");
    client.connect().await?;

    let listener = TcpListener::bind(("127.0.0.1", BRIDGE_PORT)).await?;
    println!("Listening on port {BRIDGE_PORT}");

    loop {
        let (socket, _) = listener.accept().await?;
        println!("Client connected.");

        let mut lines = BufReader::new(socket).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match serde_json::from_str::<BridgeLine>(&line) {
                Ok(parsed) => {
                    println!("Publishing [{}]: {}", parsed.topic, parsed.data);
                    if let Err(e) = client.publish(&parsed.topic, parsed.data.into_bytes()) {
                        eprintln!("Publish failed: {e}");
                    }
                }
                Err(e) => eprintln!("Invalid JSON: {e}"),
            }
        }

        println!("Client disconnected.");
    }
}
