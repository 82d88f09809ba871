use log::{error, info};

use fx_rate_feed::config::SubscriberConfig;
use fx_rate_feed::websocket::subscribe;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = SubscriberConfig::from_env();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    info!("Subscribing to '{}' at {}", config.topic_prefix, config.endpoint);

    // Connect and receive failures are fatal; there is no reconnect.
    let mut subscription = subscribe(&config.endpoint, &config.topic_prefix).await?;

    loop {
        match subscription.next_message().await {
            Ok(message) => {
                println!("[{}] {}", message.topic, message.payload);
                println!("====================================================================");
            }
            Err(e) => {
                error!("Subscription ended: {}", e);
                return Err(e.into());
            }
        }
    }
}
