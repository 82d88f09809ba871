pub mod pairs;
pub mod quote;
pub mod source;

pub use pairs::{build_universe, HubCurrencies, PairUniverse, PairView, TradedPair};
pub use quote::{derive_client_rate, format_rate, fractional_component, RateQuote, DEFAULT_MARKUP_PERCENT};
pub use source::{FixedRateSource, PairKey, RateSource};
