use log::{info, warn};
use serde::Serialize;

use crate::data::CurrencyRecord;
use crate::error::{RateError, Result};
use crate::rates::quote::{derive_client_rate, format_rate, RateQuote};
use crate::rates::source::{PairKey, RateSource};

/// The two hub currencies every other currency is quoted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubCurrencies {
    /// First and second catalog entries.
    CatalogOrder,
    Named { primary: String, secondary: String },
}

impl HubCurrencies {
    pub fn named(primary: &str, secondary: &str) -> Self {
        HubCurrencies::Named {
            primary: primary.to_string(),
            secondary: secondary.to_string(),
        }
    }

    /// Parses a comma separated list such as `USD,EUR`.
    pub fn parse(list: &str) -> Result<Self> {
        let codes: Vec<&str> = list
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .collect();

        match codes.as_slice() {
            [primary, secondary] => Ok(Self::named(primary, secondary)),
            _ => Err(RateError::Configuration(format!(
                "expected exactly two hub currencies, got '{}'",
                list
            ))),
        }
    }

    /// Catalog indexes of the primary and secondary hubs.
    fn resolve(&self, catalog: &[CurrencyRecord]) -> Result<(usize, usize)> {
        if catalog.is_empty() {
            return Err(RateError::Configuration("no currencies available".to_string()));
        }
        if catalog.len() < 2 {
            return Err(RateError::Configuration(format!(
                "at least two currencies are required to select hubs, catalog has {}",
                catalog.len()
            )));
        }

        match self {
            HubCurrencies::CatalogOrder => Ok((0, 1)),
            HubCurrencies::Named { primary, secondary } => {
                if primary == secondary {
                    return Err(RateError::Configuration(format!(
                        "hub currencies must differ, both are {}",
                        primary
                    )));
                }
                let find = |code: &str| {
                    catalog
                        .iter()
                        .position(|c| c.iso_code == code)
                        .ok_or_else(|| {
                            RateError::Configuration(format!("hub currency {} is not in the catalog", code))
                        })
                };
                Ok((find(primary.as_str())?, find(secondary.as_str())?))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TradedPair {
    pub base: CurrencyRecord,
    pub counter: CurrencyRecord,
    source_rate: RateQuote,
    internal_rate: RateQuote,
    client_rate: RateQuote,
}

impl TradedPair {
    pub fn new(
        base: CurrencyRecord,
        counter: CurrencyRecord,
        source: &dyn RateSource,
        markup_percent: f64,
    ) -> Result<Self> {
        if base.iso_code == counter.iso_code {
            return Err(RateError::Configuration(format!(
                "pair {}/{} has the same base and counter",
                base.iso_code, counter.iso_code
            )));
        }

        let key = PairKey::new(base.iso_code.clone(), counter.iso_code.clone());
        let source_rate = source.fetch_rate(&key)?;
        let internal_rate = source_rate.clone();
        let client_rate = derive_client_rate(&internal_rate, markup_percent)?;

        Ok(Self {
            base,
            counter,
            source_rate,
            internal_rate,
            client_rate,
        })
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.base.iso_code.clone(), self.counter.iso_code.clone())
    }

    pub fn source_rate(&self) -> &RateQuote {
        &self.source_rate
    }

    pub fn internal_rate(&self) -> &RateQuote {
        &self.internal_rate
    }

    /// Always derived from the internal rate; there is no setter.
    pub fn client_rate(&self) -> &RateQuote {
        &self.client_rate
    }

    /// Re-fetches the bank rate and re-derives the internal and client rates.
    /// The pair is left untouched when any step fails.
    pub fn refresh(&mut self, source: &dyn RateSource, markup_percent: f64) -> Result<()> {
        let source_rate = source.fetch_rate(&self.key())?;
        let internal_rate = source_rate.clone();
        let client_rate = derive_client_rate(&internal_rate, markup_percent)?;

        self.source_rate = source_rate;
        self.internal_rate = internal_rate;
        self.client_rate = client_rate;
        Ok(())
    }

    /// Topic the pair is published under.
    pub fn topic(&self) -> &str {
        &self.base.iso_code
    }

    /// `"<BASE>/<COUNTER> Bid:<bid>, Ask:<ask>"`
    pub fn payload(&self) -> Result<String> {
        Ok(format!(
            "{}/{} Bid:{}, Ask:{}",
            self.base.iso_code,
            self.counter.iso_code,
            format_rate(self.client_rate.bid)?,
            format_rate(self.client_rate.ask)?
        ))
    }
}

/// Serializable view of a pair for the status API.
#[derive(Debug, Clone, Serialize)]
pub struct PairView {
    pub base: String,
    pub counter: String,
    pub bid: f64,
    pub bid_pips: u64,
    pub ask: f64,
    pub ask_pips: u64,
    pub observed_at: chrono::DateTime<chrono::Utc>,
}

impl From<&TradedPair> for PairView {
    fn from(pair: &TradedPair) -> Self {
        let rate = pair.client_rate();
        Self {
            base: pair.base.iso_code.clone(),
            counter: pair.counter.iso_code.clone(),
            bid: rate.bid,
            bid_pips: rate.bid_pips,
            ask: rate.ask,
            ask_pips: rate.ask_pips,
            observed_at: rate.observed_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PairUniverse {
    pairs: Vec<TradedPair>,
}

impl PairUniverse {
    /// Builds every hub pair: the primary hub against each other currency,
    /// then the secondary hub against each currency other than both hubs.
    /// Both runs follow catalog order.
    pub fn build(
        catalog: &[CurrencyRecord],
        hubs: &HubCurrencies,
        source: &dyn RateSource,
        markup_percent: f64,
    ) -> Result<Self> {
        let (primary_idx, secondary_idx) = hubs.resolve(catalog)?;
        let primary = &catalog[primary_idx];
        let secondary = &catalog[secondary_idx];

        let mut pairs = Vec::with_capacity(catalog.len() * 2);

        for (i, currency) in catalog.iter().enumerate() {
            if i != primary_idx {
                pairs.push(TradedPair::new(primary.clone(), currency.clone(), source, markup_percent)?);
            }
        }
        for (i, currency) in catalog.iter().enumerate() {
            if i != primary_idx && i != secondary_idx {
                pairs.push(TradedPair::new(secondary.clone(), currency.clone(), source, markup_percent)?);
            }
        }

        info!(
            "Built {} pairs from {} currencies (hubs {} and {})",
            pairs.len(),
            catalog.len(),
            primary.iso_code,
            secondary.iso_code
        );

        Ok(Self { pairs })
    }

    pub fn pairs(&self) -> &[TradedPair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Refreshes every pair; a failed pair keeps its previous quote.
    /// Returns the number of pairs refreshed.
    pub fn refresh_all(&mut self, source: &dyn RateSource, markup_percent: f64) -> usize {
        let mut refreshed = 0;
        for pair in &mut self.pairs {
            match pair.refresh(source, markup_percent) {
                Ok(()) => refreshed += 1,
                Err(e) => warn!("Keeping previous rate for {}: {}", pair.key(), e),
            }
        }
        refreshed
    }

    pub fn views(&self) -> Vec<PairView> {
        self.pairs.iter().map(PairView::from).collect()
    }
}

/// Builds the pair universe; see [`PairUniverse::build`].
pub fn build_universe(
    catalog: &[CurrencyRecord],
    hubs: &HubCurrencies,
    source: &dyn RateSource,
    markup_percent: f64,
) -> Result<PairUniverse> {
    PairUniverse::build(catalog, hubs, source, markup_percent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rates::quote::DEFAULT_MARKUP_PERCENT;
    use crate::rates::source::FixedRateSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn catalog(codes: &[&str]) -> Vec<CurrencyRecord> {
        codes
            .iter()
            .enumerate()
            .map(|(i, code)| CurrencyRecord::new(i as i64 + 1, code, code, code))
            .collect()
    }

    fn pair_codes(universe: &PairUniverse) -> Vec<(String, String)> {
        universe
            .pairs()
            .iter()
            .map(|p| (p.base.iso_code.clone(), p.counter.iso_code.clone()))
            .collect()
    }

    struct FailingSource {
        calls: AtomicUsize,
        fail_after: usize,
    }

    impl RateSource for FailingSource {
        fn fetch_rate(&self, _pair: &PairKey) -> Result<RateQuote> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.fail_after {
                return Err(RateError::Transport("bank feed unavailable".to_string()));
            }
            RateQuote::new(1.25, 1.5, chrono::Utc::now())
        }
    }

    #[test]
    fn test_three_currency_universe() {
        let universe = build_universe(
            &catalog(&["USD", "EUR", "JPY"]),
            &HubCurrencies::CatalogOrder,
            &FixedRateSource::default(),
            DEFAULT_MARKUP_PERCENT,
        )
        .unwrap();

        let expected = vec![
            ("USD".to_string(), "EUR".to_string()),
            ("USD".to_string(), "JPY".to_string()),
            ("EUR".to_string(), "JPY".to_string()),
        ];
        assert_eq!(pair_codes(&universe), expected);
    }

    #[test]
    fn test_pair_count_and_no_self_pairs() {
        let codes = ["USD", "EUR", "JPY", "GBP", "AUD", "CAD", "CHF", "CNY"];
        for n in 2..=codes.len() {
            let universe = build_universe(
                &catalog(&codes[..n]),
                &HubCurrencies::CatalogOrder,
                &FixedRateSource::default(),
                DEFAULT_MARKUP_PERCENT,
            )
            .unwrap();

            assert_eq!(universe.len(), 2 * (n - 1) - 1);
            assert!(universe.pairs().iter().all(|p| p.base.iso_code != p.counter.iso_code));
        }
    }

    #[test]
    fn test_empty_and_single_catalog_rejected() {
        let source = FixedRateSource::default();
        let err = build_universe(&[], &HubCurrencies::CatalogOrder, &source, 0.05).unwrap_err();
        assert!(matches!(err, RateError::Configuration(ref m) if m.contains("no currencies")));

        let err = build_universe(&catalog(&["USD"]), &HubCurrencies::CatalogOrder, &source, 0.05).unwrap_err();
        assert!(matches!(err, RateError::Configuration(_)));
    }

    #[test]
    fn test_named_hubs_independent_of_catalog_order() {
        let universe = build_universe(
            &catalog(&["JPY", "EUR", "USD"]),
            &HubCurrencies::named("USD", "EUR"),
            &FixedRateSource::default(),
            DEFAULT_MARKUP_PERCENT,
        )
        .unwrap();

        let expected = vec![
            ("USD".to_string(), "JPY".to_string()),
            ("USD".to_string(), "EUR".to_string()),
            ("EUR".to_string(), "JPY".to_string()),
        ];
        assert_eq!(pair_codes(&universe), expected);
    }

    #[test]
    fn test_named_hub_misconfiguration() {
        let source = FixedRateSource::default();
        let currencies = catalog(&["USD", "EUR", "JPY"]);

        let err = build_universe(&currencies, &HubCurrencies::named("USD", "GBP"), &source, 0.05).unwrap_err();
        assert!(matches!(err, RateError::Configuration(ref m) if m.contains("GBP")));

        let err = build_universe(&currencies, &HubCurrencies::named("USD", "USD"), &source, 0.05).unwrap_err();
        assert!(matches!(err, RateError::Configuration(_)));
    }

    #[test]
    fn test_parse_hub_list() {
        assert_eq!(HubCurrencies::parse("USD, EUR").unwrap(), HubCurrencies::named("USD", "EUR"));
        assert!(HubCurrencies::parse("USD").is_err());
        assert!(HubCurrencies::parse("USD,EUR,JPY").is_err());
    }

    #[test]
    fn test_client_rate_derived_from_internal_rate() {
        let universe = build_universe(
            &catalog(&["USD", "EUR"]),
            &HubCurrencies::CatalogOrder,
            &FixedRateSource::default(),
            DEFAULT_MARKUP_PERCENT,
        )
        .unwrap();

        let pair = &universe.pairs()[0];
        let expected = derive_client_rate(pair.internal_rate(), DEFAULT_MARKUP_PERCENT).unwrap();
        assert_eq!(pair.client_rate(), &expected);
        assert_eq!(pair.topic(), "USD");
        assert_eq!(
            pair.payload().unwrap(),
            format!(
                "USD/EUR Bid:{}, Ask:{}",
                format_rate(expected.bid).unwrap(),
                format_rate(expected.ask).unwrap()
            )
        );
    }

    #[test]
    fn test_refresh_keeps_previous_rate_on_failure() {
        let source = FailingSource {
            calls: AtomicUsize::new(0),
            fail_after: 3,
        };
        let mut universe = build_universe(
            &catalog(&["USD", "EUR", "JPY"]),
            &HubCurrencies::CatalogOrder,
            &source,
            0.0,
        )
        .unwrap();

        let before: Vec<RateQuote> = universe.pairs().iter().map(|p| p.client_rate().clone()).collect();
        assert_eq!(universe.refresh_all(&source, 0.0), 0);
        let after: Vec<RateQuote> = universe.pairs().iter().map(|p| p.client_rate().clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_refresh_rederives_client_from_internal_rate() {
        let mut universe = build_universe(
            &catalog(&["USD", "EUR", "JPY"]),
            &HubCurrencies::CatalogOrder,
            &FixedRateSource::default(),
            DEFAULT_MARKUP_PERCENT,
        )
        .unwrap();

        let live = FixedRateSource::new(1.0842, 1.0845);
        assert_eq!(universe.refresh_all(&live, DEFAULT_MARKUP_PERCENT), 3);

        for pair in universe.pairs() {
            assert_eq!(pair.source_rate().bid, 1.0842);
            assert_eq!(pair.internal_rate(), pair.source_rate());
            let expected = derive_client_rate(pair.internal_rate(), DEFAULT_MARKUP_PERCENT).unwrap();
            assert_eq!(pair.client_rate(), &expected);
        }
    }
}
