use anyhow::{Context, Result};
use sector_ranking::{FetchSettings, SectorUniverse};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Required for live data; snapshot runs work without it
    pub polygon_api_key: Option<String>,
    /// Alternate Polygon host, e.g. a caching proxy
    pub polygon_base_url: Option<String>,
    pub universe_path: Option<PathBuf>,
    pub market: String,
    pub fetch_timeout_secs: u64,
    pub concurrency: usize,
    pub cache_ttl_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Self {
            polygon_api_key: lookup("POLYGON_API_KEY").filter(|k| !k.trim().is_empty()),
            polygon_base_url: lookup("POLYGON_BASE_URL").filter(|u| !u.trim().is_empty()),
            universe_path: lookup("MORNING_ALPHA_UNIVERSE").map(PathBuf::from),
            market: lookup("MORNING_ALPHA_MARKET").unwrap_or_else(|| "US".to_string()),
            fetch_timeout_secs: parse_or(&lookup, "MORNING_ALPHA_FETCH_TIMEOUT_SECS", 20)?,
            concurrency: parse_or(&lookup, "MORNING_ALPHA_CONCURRENCY", 8)?,
            cache_ttl_secs: parse_or(&lookup, "MORNING_ALPHA_CACHE_TTL_SECS", 300)?,
        };

        if config.concurrency == 0 {
            anyhow::bail!("MORNING_ALPHA_CONCURRENCY must be at least 1");
        }
        if config.cache_ttl_secs < 0 {
            anyhow::bail!("MORNING_ALPHA_CACHE_TTL_SECS must not be negative");
        }

        Ok(config)
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            concurrency: self.concurrency,
            timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs)
    }

    /// Universe file if one is configured, otherwise the market preset.
    pub fn load_universe(&self) -> Result<SectorUniverse> {
        match &self.universe_path {
            Some(path) => SectorUniverse::load(path)
                .with_context(|| format!("Failed to load sector universe from {}", path.display())),
            None => SectorUniverse::for_market(&self.market).context("Unknown market"),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let env = vars(&[]);
        let config = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert!(config.polygon_api_key.is_none());
        assert!(config.polygon_base_url.is_none());
        assert_eq!(config.market, "US");
        assert_eq!(config.fetch_timeout_secs, 20);
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.fetch_settings().timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_overrides_and_blank_key() {
        let env = vars(&[
            ("POLYGON_API_KEY", "  "),
            ("MORNING_ALPHA_MARKET", "BIST"),
            ("MORNING_ALPHA_CONCURRENCY", "3"),
            ("MORNING_ALPHA_CACHE_TTL_SECS", "0"),
            ("POLYGON_BASE_URL", "http://localhost:8089"),
        ]);
        let config = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert!(config.polygon_api_key.is_none());
        assert_eq!(config.polygon_base_url.as_deref(), Some("http://localhost:8089"));
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.cache_ttl(), chrono::Duration::zero());
        assert_eq!(config.load_universe().unwrap().market, "BIST");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let env = vars(&[("MORNING_ALPHA_CONCURRENCY", "many")]);
        assert!(AppConfig::from_lookup(|k| env.get(k).cloned()).is_err());

        let env = vars(&[("MORNING_ALPHA_CONCURRENCY", "0")]);
        assert!(AppConfig::from_lookup(|k| env.get(k).cloned()).is_err());

        let env = vars(&[("MORNING_ALPHA_MARKET", "LSE")]);
        let config = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert!(config.load_universe().is_err());
    }

    #[test]
    fn test_universe_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
market = "TEST"

[[sectors]]
name = "Tech"
tracking_symbol = "XLK"
constituents = ["AAPL", "MSFT"]
"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let env = vars(&[("MORNING_ALPHA_UNIVERSE", path.as_str())]);
        let config = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        let universe = config.load_universe().unwrap();
        assert_eq!(universe.market, "TEST");
        assert_eq!(universe.sectors().len(), 1);
    }
}
