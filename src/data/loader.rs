use std::collections::HashSet;
use std::fmt;
use std::fs;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{RateError, Result};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CurrencyRecord {
    #[serde(rename = "Key")]
    pub key: i64,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ISO")]
    pub iso_code: String,
    #[serde(rename = "Symbol")]
    pub symbol: String,
}

impl CurrencyRecord {
    pub fn new(key: i64, name: &str, iso_code: &str, symbol: &str) -> Self {
        Self {
            key,
            name: name.to_string(),
            iso_code: iso_code.to_string(),
            symbol: symbol.to_string(),
        }
    }
}

pub fn is_valid_iso_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

#[derive(Deserialize, Serialize, Clone)]
pub struct TraderRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(rename = "ip_address")]
    pub ip: String,
    pub cell: String,
    #[serde(rename = "business")]
    pub business_phone: String,
    #[serde(rename = "bank")]
    pub bank_account: String,
    pub credit_card: String,
}

impl TraderRecord {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// Contact and payment fields stay out of logs.
impl fmt::Debug for TraderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraderRecord")
            .field("id", &self.id)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish_non_exhaustive()
    }
}

pub struct CatalogLoader;

impl CatalogLoader {
    /// Loads the currency catalog, preserving file order. Records with a
    /// malformed or repeated ISO code are skipped.
    pub fn load_currencies(file_path: &str) -> Result<Vec<CurrencyRecord>> {
        let raw: Vec<CurrencyRecord> = Self::read_json(file_path)?;
        let total = raw.len();

        let mut seen = HashSet::new();
        let mut currencies = Vec::with_capacity(total);
        let mut skipped = 0;

        for mut record in raw {
            record.iso_code = record.iso_code.trim().to_string();

            if !is_valid_iso_code(&record.iso_code) {
                error!("Skipping currency '{}' with invalid ISO code '{}'", record.name, record.iso_code);
                skipped += 1;
                continue;
            }
            if !seen.insert(record.iso_code.clone()) {
                error!("Skipping duplicate currency code {}", record.iso_code);
                skipped += 1;
                continue;
            }
            currencies.push(record);
        }

        if skipped > 0 {
            warn!("Loaded {} of {} currencies from {} ({} skipped)", currencies.len(), total, file_path, skipped);
        } else {
            info!("Successfully loaded {} currencies from {}", currencies.len(), file_path);
        }

        Ok(currencies)
    }

    pub fn load_traders(file_path: &str) -> Result<Vec<TraderRecord>> {
        let traders: Vec<TraderRecord> = Self::read_json(file_path)?;
        info!("Successfully loaded {} traders from {}", traders.len(), file_path);
        Ok(traders)
    }

    fn read_json<T: serde::de::DeserializeOwned>(file_path: &str) -> Result<T> {
        let raw = fs::read_to_string(file_path).map_err(|source| RateError::Io {
            path: file_path.to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| RateError::Parse {
            path: file_path.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_fixture(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_currencies_preserves_order() {
        let file = write_fixture(
            r#"[
                {"Key": 1, "Name": "United States dollar", "ISO": "USD", "Symbol": "US$"},
                {"Key": 2, "Name": "Euro", "ISO": "EUR", "Symbol": "€"},
                {"Key": 3, "Name": "Japanese yen", "ISO": "JPY", "Symbol": "¥"}
            ]"#,
        );

        let currencies = CatalogLoader::load_currencies(file.path().to_str().unwrap()).unwrap();
        let codes: Vec<&str> = currencies.iter().map(|c| c.iso_code.as_str()).collect();
        assert_eq!(codes, vec!["USD", "EUR", "JPY"]);
        assert_eq!(currencies[1].symbol, "€");
    }

    #[test]
    fn test_load_currencies_trims_and_skips_bad_codes() {
        let file = write_fixture(
            r#"[
                {"Key": 1, "Name": "United States dollar", "ISO": "USD", "Symbol": "US$"},
                {"Key": 22, "Name": "Polish zloty", "ISO": "PLN ", "Symbol": "zł"},
                {"Key": 27, "Name": "Saudi riyal", "ISO": "AR", "Symbol": "﷼"},
                {"Key": 99, "Name": "Duplicate dollar", "ISO": "USD", "Symbol": "$"}
            ]"#,
        );

        let currencies = CatalogLoader::load_currencies(file.path().to_str().unwrap()).unwrap();
        let codes: Vec<&str> = currencies.iter().map(|c| c.iso_code.as_str()).collect();
        assert_eq!(codes, vec!["USD", "PLN"]);
    }

    #[test]
    fn test_load_currencies_empty_and_missing() {
        let file = write_fixture("[]");
        assert!(CatalogLoader::load_currencies(file.path().to_str().unwrap()).unwrap().is_empty());

        let err = CatalogLoader::load_currencies("/nonexistent/currencies.json").unwrap_err();
        assert!(err.is_not_found());

        let file = write_fixture("{not json");
        let err = CatalogLoader::load_currencies(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, RateError::Parse { .. }));
    }

    #[test]
    fn test_trader_debug_redacts_sensitive_fields() {
        let file = write_fixture(
            r#"[{"id": "1", "first_name": "Ada", "last_name": "Byron", "email": "ada@example.com",
                 "ip_address": "10.0.0.1", "cell": "555-0100", "business": "555-0101",
                 "bank": "GB00TEST", "credit_card": "4111111111111111"}]"#,
        );

        let traders = CatalogLoader::load_traders(file.path().to_str().unwrap()).unwrap();
        assert_eq!(traders[0].display_name(), "Ada Byron");
        let rendered = format!("{:?}", traders[0]);
        assert!(!rendered.contains("4111"));
        assert!(!rendered.contains("ada@example.com"));
    }
}
