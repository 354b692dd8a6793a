//! Domain error types.

/// Top-level error type for tiertrader.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no data for {instrument} {timeframe}")]
    NoData {
        instrument: String,
        timeframe: String,
    },

    #[error("insufficient data for {instrument} {timeframe}: have {bars} bars, need {minimum}")]
    InsufficientData {
        instrument: String,
        timeframe: String,
        bars: usize,
        minimum: usize,
    },

    #[error("malformed bar at index {index}: {reason}")]
    MalformedBar { index: usize, reason: String },

    #[error("{instrument}: {reason}")]
    External { instrument: String, reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraderError {
    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        TraderError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn external(instrument: &str, reason: impl Into<String>) -> Self {
        TraderError::External {
            instrument: instrument.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&TraderError> for std::process::ExitCode {
    fn from(err: &TraderError) -> Self {
        let code: u8 = match err {
            TraderError::Io(_) | TraderError::Csv(_) => 1,
            TraderError::ConfigParse { .. }
            | TraderError::ConfigMissing { .. }
            | TraderError::ConfigInvalid { .. } => 2,
            TraderError::External { .. } => 3,
            TraderError::MalformedBar { .. } => 4,
            TraderError::NoData { .. } | TraderError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_invalid_message() {
        let err = TraderError::config_invalid("backtest", "trade_size", "must be positive");
        assert_eq!(
            err.to_string(),
            "invalid config value [backtest] trade_size: must be positive"
        );
    }

    #[test]
    fn insufficient_data_message() {
        let err = TraderError::InsufficientData {
            instrument: "BTC/USDT".into(),
            timeframe: "1h".into(),
            bars: 10,
            minimum: 51,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data for BTC/USDT 1h: have 10 bars, need 51"
        );
    }

    #[test]
    fn external_message() {
        let err = TraderError::external("ETH/USDT", "exchange timeout");
        assert_eq!(err.to_string(), "ETH/USDT: exchange timeout");
    }
}
