//! Currency-pair rate feed.
//!
//! The publisher builds a universe of traded pairs from a currency catalog,
//! applies a client markup to each pair's bank rate, and broadcasts every
//! pair's quote over WebSocket under a topic equal to the pair's base ISO
//! code. Subscribers register a topic prefix and only receive matching quotes.

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod rates;
pub mod websocket;

pub use error::{RateError, Result};
