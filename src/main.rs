use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::interval;
use tower_http::cors::CorsLayer;

use fx_rate_feed::api::{create_api_router, ApiState};
use fx_rate_feed::config::{Config, BROADCAST_CHANNEL_SIZE, STATS_INTERVAL_SECS};
use fx_rate_feed::data::{BroadcastLoop, BroadcastSettings, BroadcastStats, CatalogLoader, TopicBus};
use fx_rate_feed::rates::{build_universe, FixedRateSource, RateSource};
use fx_rate_feed::websocket::serve_subscribers;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    config.log_config();

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e.into());
    }

    log_traders(&config.trader_file);

    let currencies = CatalogLoader::load_currencies(&config.currency_file)?;
    let source: Arc<dyn RateSource> = Arc::new(FixedRateSource::default());
    let mut universe = match build_universe(&currencies, &config.hubs()?, source.as_ref(), config.markup_percent) {
        Ok(universe) => universe,
        Err(e) => {
            error!("Cannot build pair universe: {}", e);
            return Err(e.into());
        }
    };

    let bus = Arc::new(TopicBus::new(BROADCAST_CHANNEL_SIZE));
    let broadcaster = BroadcastLoop::new(
        BroadcastSettings {
            markup_percent: config.markup_percent,
            cycle_interval: config.cycle_interval(),
            refresh_rates: config.refresh_rates,
        },
        source,
    );
    let stats = broadcaster.stats();

    // Bind failures are fatal
    let ws_listener = TcpListener::bind(&config.bind_address).await?;
    info!("🚀 Rate publisher listening at ws://{}/rates", config.bind_address);

    broadcaster.publish_snapshot(&universe);
    let api_state = ApiState {
        pairs: broadcaster.snapshots(),
        stats: stats.clone(),
        bus: bus.clone(),
    };
    let api_router = create_api_router(api_state).layer(CorsLayer::permissive());
    let api_listener = TcpListener::bind(&config.api_bind_address).await?;
    info!("🌐 Status API running at http://{}/api", config.api_bind_address);

    start_stats_task(stats, bus.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
        if shutdown_tx.send(true).is_err() {
            warn!("Broadcast loop already stopped before shutdown signal");
        }
    });

    let broadcast_bus = bus.clone();
    let broadcast = async move {
        broadcaster.run(&mut universe, broadcast_bus.as_ref(), shutdown_rx).await
    };

    tokio::select! {
        result = broadcast => {
            result?;
            info!("Publisher stopped");
        }
        _ = serve_subscribers(ws_listener, bus) => {
            error!("Subscriber server stopped");
        }
        result = axum::serve(api_listener, api_router) => {
            error!("API server stopped: {:?}", result);
        }
    }

    Ok(())
}

fn log_traders(trader_file: &str) {
    match CatalogLoader::load_traders(trader_file) {
        Ok(traders) => match traders.first() {
            Some(first) => info!("Loaded {} traders, first: {}", traders.len(), first.display_name()),
            None => warn!("Trader file {} has no records", trader_file),
        },
        Err(e) => warn!("Trader records unavailable: {}", e),
    }
}

fn start_stats_task(stats: Arc<BroadcastStats>, bus: Arc<TopicBus>) {
    tokio::spawn(async move {
        let mut interval_timer = interval(Duration::from_secs(STATS_INTERVAL_SECS));

        loop {
            interval_timer.tick().await;
            let snapshot = stats.snapshot();
            info!(
                "Stats - Cycles: {}, Messages: {}, Failures: {}, Subscribers: {}",
                snapshot.cycles,
                snapshot.messages_sent,
                snapshot.send_failures,
                bus.subscriber_count()
            );
        }
    });

    info!("📈 Started stats monitoring task (every {} seconds)", STATS_INTERVAL_SECS);
}
