use std::env;
use std::time::Duration;
use log::warn;

use crate::error::{RateError, Result};
use crate::rates::{HubCurrencies, DEFAULT_MARKUP_PERCENT};

// Server Configuration
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5563";
pub const DEFAULT_API_BIND_ADDRESS: &str = "127.0.0.1:8081";
pub const STATS_INTERVAL_SECS: u64 = 60;

// Data Configuration
pub const DEFAULT_CURRENCY_FILE: &str = "./data/currencies.json";
pub const DEFAULT_TRADER_FILE: &str = "./data/traders.json";

// Broadcast Configuration
pub const BROADCAST_CHANNEL_SIZE: usize = 1024;
pub const DEFAULT_CYCLE_INTERVAL_MS: u64 = 500;

// Subscriber Configuration
pub const DEFAULT_SUBSCRIBE_ENDPOINT: &str = "localhost:5563";
pub const DEFAULT_TOPIC_PREFIX: &str = "USD";

pub struct Config {
    pub bind_address: String,
    pub api_bind_address: String,
    pub currency_file: String,
    pub trader_file: String,
    /// Unset means the first two catalog entries.
    pub hub_currencies: Option<String>,
    pub markup_percent: f64,
    pub cycle_interval_ms: u64,
    pub refresh_rates: bool,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            api_bind_address: env::var("API_BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_API_BIND_ADDRESS.to_string()),
            currency_file: env::var("CURRENCY_FILE")
                .unwrap_or_else(|_| DEFAULT_CURRENCY_FILE.to_string()),
            trader_file: env::var("TRADER_FILE")
                .unwrap_or_else(|_| DEFAULT_TRADER_FILE.to_string()),
            hub_currencies: env::var("HUB_CURRENCIES").ok().filter(|v| !v.trim().is_empty()),
            markup_percent: parse_env("MARKUP_PERCENT", DEFAULT_MARKUP_PERCENT),
            cycle_interval_ms: parse_env("CYCLE_INTERVAL_MS", DEFAULT_CYCLE_INTERVAL_MS),
            refresh_rates: parse_env("RATE_REFRESH", true),
            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.markup_percent.is_finite() || self.markup_percent <= -1.0 {
            return Err(RateError::Configuration(format!(
                "markup must be a finite value above -1.0, got {}",
                self.markup_percent
            )));
        }

        if self.markup_percent < 0.0 {
            warn!("Negative markup {} quotes clients below the bank rate", self.markup_percent);
        }

        if !std::path::Path::new(&self.currency_file).exists() {
            return Err(RateError::Configuration(format!(
                "Currency file not found: {}",
                self.currency_file
            )));
        }

        self.hubs()?;
        Ok(())
    }

    pub fn hubs(&self) -> Result<HubCurrencies> {
        match &self.hub_currencies {
            Some(list) => HubCurrencies::parse(list),
            None => Ok(HubCurrencies::CatalogOrder),
        }
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn log_config(&self) {
        println!("Publisher Configuration:");
        println!("  Bind Address: {}", self.bind_address);
        println!("  API Bind Address: {}", self.api_bind_address);
        println!("  Currency File: {}", self.currency_file);
        println!("  Trader File: {}", self.trader_file);
        println!(
            "  Hub Currencies: {}",
            self.hub_currencies.as_deref().unwrap_or("first two catalog entries")
        );
        println!("  Markup: {}", self.markup_percent);
        println!("  Cycle Interval: {}ms", self.cycle_interval_ms);
        println!("  Rate Refresh: {}", self.refresh_rates);
        println!("  Log Level: {}", self.log_level);
    }
}

pub struct SubscriberConfig {
    pub endpoint: String,
    pub topic_prefix: String,
    pub log_level: String,
}

impl SubscriberConfig {
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var("SUBSCRIBE_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_SUBSCRIBE_ENDPOINT.to_string()),
            topic_prefix: env::var("TOPIC_PREFIX")
                .unwrap_or_else(|_| DEFAULT_TOPIC_PREFIX.to_string()),
            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string()),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring invalid {}='{}', using default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}
