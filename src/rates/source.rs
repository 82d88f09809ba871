use std::fmt;

use chrono::Utc;

use crate::error::Result;
use crate::rates::quote::RateQuote;

pub const FIXED_SOURCE_BID: f64 = 0.89567;
pub const FIXED_SOURCE_ASK: f64 = 0.89564;

/// Identifies a pair by its base and counter ISO codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    pub base: String,
    pub counter: String,
}

impl PairKey {
    pub fn new(base: impl Into<String>, counter: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            counter: counter.into(),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.counter)
    }
}

/// Supplier of bank rates for a pair.
pub trait RateSource: Send + Sync {
    fn fetch_rate(&self, pair: &PairKey) -> Result<RateQuote>;
}

/// Quotes the same bid/ask for every pair, stamped with the fetch time.
#[derive(Debug, Clone)]
pub struct FixedRateSource {
    bid: f64,
    ask: f64,
}

impl FixedRateSource {
    pub fn new(bid: f64, ask: f64) -> Self {
        Self { bid, ask }
    }
}

impl Default for FixedRateSource {
    fn default() -> Self {
        Self::new(FIXED_SOURCE_BID, FIXED_SOURCE_ASK)
    }
}

impl RateSource for FixedRateSource {
    fn fetch_rate(&self, _pair: &PairKey) -> Result<RateQuote> {
        RateQuote::new(self.bid, self.ask, Utc::now())
    }
}
