use thiserror::Error;

/// Errors raised across the rate feed: universe construction, transport and
/// catalog loading.
#[derive(Error, Debug)]
pub enum RateError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Cannot render rate {0} in fixed-point form")]
    Formatting(f64),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RateError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RateError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RateError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        RateError::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_kind_is_preserved() {
        let err = RateError::Io {
            path: "missing.json".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.is_not_found());
        assert!(err.to_string().contains("missing.json"));

        let err = RateError::Configuration("no currencies available".to_string());
        assert!(!err.is_not_found());
    }
}
