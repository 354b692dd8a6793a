//! INI file configuration adapter.
//!
//! configparser lowercases section and key names, so lookups are
//! case-insensitive.

use crate::domain::error::TraderError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TraderError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| TraderError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, TraderError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| TraderError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn sections(&self) -> Vec<String> {
        let mut sections = self.config.sections();
        sections.sort();
        sections
    }

    fn keys(&self, section: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .config
            .get_map_ref()
            .get(&section.to_lowercase())
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[backtest]
initial_balance = 2500.0
instruments = BTC/USDT, ETH/USDT

[decision]
macro_timeframes = 4h,1d
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("backtest", "instruments"),
            Some("BTC/USDT, ETH/USDT".to_string())
        );
        assert_eq!(
            adapter.get_string("decision", "macro_timeframes"),
            Some("4h,1d".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[backtest]\ntrade_size = 1\n").unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn empty_value_reads_as_missing() {
        let adapter = FileConfigAdapter::from_string("[search]\nseed =\n").unwrap();
        assert_eq!(adapter.get_string("search", "seed"), None);
    }

    #[test]
    fn lookups_ignore_case() {
        let adapter =
            FileConfigAdapter::from_string("[BTCUSDT@1h]\nEMA_Fast = 9\n").unwrap();
        assert_eq!(adapter.get_string("btcusdt@1h", "ema_fast"), Some("9".to_string()));
        assert_eq!(adapter.get_string("BTCUSDT@1h", "EMA_FAST"), Some("9".to_string()));
    }

    #[test]
    fn lists_sections_and_keys() {
        let content =
            "[defaults]\nrsi_length = 14\nweight_ema = 1.2\n\n[ETHUSDT@15m]\nstoploss = 0.02\n";
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(adapter.sections(), vec!["defaults", "ethusdt@15m"]);
        assert_eq!(adapter.keys("defaults"), vec!["rsi_length", "weight_ema"]);
        assert_eq!(adapter.keys("ETHUSDT@15m"), vec!["stoploss"]);
        assert!(adapter.keys("nope").is_empty());
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[backtest]\ndata_dir = /var/lib/ohlcv\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("backtest", "data_dir"),
            Some("/var/lib/ohlcv".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(TraderError::ConfigParse { .. })));
    }
}
