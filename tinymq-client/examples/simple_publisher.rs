//! Publishes a handful of readings to the `weather` topic.

use std::time::Duration;

use flexi_logger::{colored_opt_format, Logger};
use tinymq_client::Client;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    Logger::try_with_str("debug")?
        .format(colored_opt_format)
        .start()?;

    let mut client = Client::new("publisher-demo");
    client.connect().await?;

    for degrees in 60..70 {
        client.publish("weather", format!("{degrees}F").into_bytes())?;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    client.disconnect();
    Ok(())
}
