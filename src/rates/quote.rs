use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RateError, Result};

/// Digits rendered after the decimal point for every quoted rate.
pub const RATE_DECIMALS: usize = 6;

/// Default client markup applied on top of the internal rate (5%).
pub const DEFAULT_MARKUP_PERCENT: f64 = 0.05;

/// Bid/ask quote at a point in time. The pip fields are display-only and
/// always hold the fractional digits of `bid` and `ask`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub bid: f64,
    pub bid_pips: u64,
    pub ask: f64,
    pub ask_pips: u64,
    pub observed_at: DateTime<Utc>,
}

impl RateQuote {
    pub fn new(bid: f64, ask: f64, observed_at: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            bid,
            bid_pips: fractional_component(bid)?,
            ask,
            ask_pips: fractional_component(ask)?,
            observed_at,
        })
    }
}

/// Renders a rate in fixed-point form, e.g. `0.940454`.
pub fn format_rate(rate: f64) -> Result<String> {
    if !rate.is_finite() {
        return Err(RateError::Formatting(rate));
    }
    Ok(format!("{:.*}", RATE_DECIMALS, rate))
}

/// Digits after the decimal point of the fixed-point rendering, read as an
/// unsigned pip count. `0.895670` yields `895670`.
pub fn fractional_component(rate: f64) -> Result<u64> {
    let rendered = format_rate(rate)?;
    let (_, fraction) = rendered
        .split_once('.')
        .ok_or(RateError::Formatting(rate))?;
    fraction.parse::<u64>().map_err(|_| RateError::Formatting(rate))
}

/// Applies the client markup to both sides of `source`, keeping its timestamp.
pub fn derive_client_rate(source: &RateQuote, markup_percent: f64) -> Result<RateQuote> {
    let factor = 1.0 + markup_percent;
    RateQuote::new(source.bid * factor, source.ask * factor, source.observed_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(bid: f64, ask: f64) -> RateQuote {
        RateQuote::new(bid, ask, Utc::now()).unwrap()
    }

    #[test]
    fn test_fractional_component_reads_six_digits() {
        assert_eq!(fractional_component(0.89567).unwrap(), 895670);
        assert_eq!(fractional_component(1.5).unwrap(), 500000);
        assert_eq!(fractional_component(132.000042).unwrap(), 42);
        assert_eq!(fractional_component(7.0).unwrap(), 0);
    }

    #[test]
    fn test_fractional_component_is_idempotent() {
        for rate in [0.89567, 0.9404535, 1.0842, 151.2345678, 0.0001] {
            let first = fractional_component(rate).unwrap();
            let second = fractional_component(rate).unwrap();
            assert_eq!(first, second);

            let rendered = format_rate(rate).unwrap();
            let digits = rendered.split('.').nth(1).unwrap();
            assert_eq!(first, digits.parse::<u64>().unwrap());
        }
    }

    #[test]
    fn test_non_finite_rate_is_a_formatting_error() {
        assert!(matches!(fractional_component(f64::NAN), Err(RateError::Formatting(_))));
        assert!(matches!(format_rate(f64::INFINITY), Err(RateError::Formatting(_))));
    }

    #[test]
    fn test_derive_client_rate_applies_markup() {
        let sources = [quote(0.89567, 0.89564), quote(1.0842, 1.0845), quote(151.23, 151.27)];
        for source in &sources {
            let client = derive_client_rate(source, DEFAULT_MARKUP_PERCENT).unwrap();
            assert!((client.bid - source.bid * 1.05).abs() < 1e-12);
            assert!((client.ask - source.ask * 1.05).abs() < 1e-12);
            assert_eq!(client.observed_at, source.observed_at);
            assert_eq!(client.bid_pips, fractional_component(client.bid).unwrap());
            assert_eq!(client.ask_pips, fractional_component(client.ask).unwrap());
        }
    }

    #[test]
    fn test_derive_client_rate_is_deterministic() {
        let source = quote(0.89567, 0.89564);
        let a = derive_client_rate(&source, 0.02).unwrap();
        let b = derive_client_rate(&source, 0.02).unwrap();
        assert_eq!(a, b);

        let unchanged = derive_client_rate(&source, 0.0).unwrap();
        assert_eq!(unchanged.bid, source.bid);
        assert_eq!(unchanged.ask_pips, source.ask_pips);
    }
}
