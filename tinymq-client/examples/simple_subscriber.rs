//! Subscribes to the `weather` topic and prints every message until ctrl-c.

use flexi_logger::{colored_opt_format, Logger};
use tinymq_client::Client;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    Logger::try_with_str("debug")?
        .format(colored_opt_format)
        .start()?;

    let mut client = Client::new("subscriber-demo");
    client.connect().await?;

    client.subscribe("weather", |topic, message| {
        println!("[{topic}] {}", String::from_utf8_lossy(message));
    })?;

    tokio::signal::ctrl_c().await?;
    client.disconnect();
    Ok(())
}
