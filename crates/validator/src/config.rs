use std::path::Path;
use std::time::{Duration, Instant};

use appvalidator_js::JsBackend;
use appvalidator_spec::DEFAULT_MARKET_URLS;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, ValidatorError};

/// Configuration for a validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// The app is headed for the marketplace
    pub listed: bool,
    /// Keep running later tiers after a tier fails
    pub determined: bool,
    /// Wall-clock guard for the whole run, in seconds; `None` disables it
    #[serde(with = "seconds")]
    pub timeout: Option<Duration>,
    /// Marketplace origins accepted in `installs_allowed_from`
    pub market_urls: Vec<String>,
    /// Parser that turns scripts into trees
    pub js_backend: JsBackend,
    /// Enables the resource tier
    pub fetch_resources: bool,
    /// Maximum number of bytes read from a fetched resource
    pub max_resource_size: usize,
    /// Base for resolving relative resource paths of hosted apps
    pub manifest_url: Option<String>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            listed: true,
            determined: true,
            timeout: Some(Duration::from_secs(60)),
            market_urls: DEFAULT_MARKET_URLS.iter().map(|url| url.to_string()).collect(),
            js_backend: JsBackend::default(),
            fetch_resources: false,
            max_resource_size: 2 * 1024 * 1024, // 2MB
            manifest_url: None,
        }
    }
}

impl ValidatorConfig {
    /// Loads a configuration from a JSON file. Missing fields take their
    /// defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.check()?;
        Ok(config)
    }

    /// Rejects settings no run could work with
    pub fn check(&self) -> Result<()> {
        for market in &self.market_urls {
            Url::parse(market)
                .map_err(|e| ValidatorError::Config(format!("market url {:?}: {}", market, e)))?;
        }
        if let Some(base) = &self.manifest_url {
            Url::parse(base)?;
        }
        if self.max_resource_size == 0 {
            return Err(ValidatorError::Config("max_resource_size must be positive".into()));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(ValidatorError::Config("timeout must be positive".into()));
        }
        Ok(())
    }

    /// The instant a run started at `start` must finish by
    pub fn deadline_from(&self, start: Instant) -> Option<Instant> {
        self.timeout.map(|timeout| start + timeout)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout.map_or(0, |timeout| timeout.as_secs())
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ValidatorConfig::default();
        assert!(config.listed);
        assert!(config.determined);
        assert_eq!(config.timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.market_urls.len(), 2);
        assert_eq!(config.js_backend, JsBackend::Builtin);
        assert!(!config.fetch_resources);
        assert_eq!(config.max_resource_size, 2 * 1024 * 1024);
        assert_eq!(config.manifest_url, None);
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"listed": false, "timeout": 5, "js_backend": {{"kind": "acorn"}}}}"#).unwrap();

        let config = ValidatorConfig::from_file(file.path()).unwrap();
        assert!(!config.listed);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.timeout_secs(), 5);
        assert!(matches!(config.js_backend, JsBackend::Acorn { .. }));
        assert!(config.determined);
    }

    #[test]
    fn test_null_timeout_disables_the_guard() {
        let config: ValidatorConfig = serde_json::from_str(r#"{"timeout": null}"#).unwrap();
        assert_eq!(config.timeout, None);
        assert_eq!(config.deadline_from(Instant::now()), None);
    }

    #[test]
    fn test_check_rejects_bad_values() {
        let mut config = ValidatorConfig::default();
        config.market_urls.push("not a url".into());
        assert!(matches!(config.check(), Err(ValidatorError::Config(_))));

        let config = ValidatorConfig { max_resource_size: 0, ..ValidatorConfig::default() };
        assert!(config.check().is_err());

        let config = ValidatorConfig { timeout: Some(Duration::ZERO), ..ValidatorConfig::default() };
        assert!(config.check().is_err());
    }
}
