pub mod handler;
pub mod client;

pub use handler::{serve_subscribers, WebSocketHandler, RATES_PATH};
pub use client::{endpoint_url, subscribe, Subscription};
