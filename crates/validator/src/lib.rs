//! Validator for open web apps.
//!
//! Validates hosted app manifests and packaged apps. Packages run through a
//! tiered pipeline: structure first, then the manifest schema, permissions,
//! locales and every stylesheet, script and document the package ships,
//! and optionally the resources the manifest points at.

pub mod config;
pub mod driver;
pub mod error;
pub mod markup;
pub mod package;
pub mod testcases;
pub mod unicode;
pub mod webapp;

use std::path::Path;

use appvalidator_report::{Diagnostic, ErrorBundle};
use appvalidator_spec::DEFAULT_MARKET_URLS;
use serde_json::Value;
use url::Url;

pub use appvalidator_report as report;
pub use config::ValidatorConfig;
pub use error::{Result, ValidatorError};
pub use package::Package;
pub use webapp::{detect_webapp_string, MANIFEST_NAME};

/// Validates a manifest given as a JSON string.
///
/// `market_urls` replaces the default marketplace origins accepted in
/// `installs_allowed_from`; it only matters for listed apps.
pub fn validate_app(data: &str, listed: bool, market_urls: Option<Vec<String>>) -> ErrorBundle {
    let mut err = ErrorBundle::new(listed);
    let market_urls =
        market_urls.unwrap_or_else(|| DEFAULT_MARKET_URLS.iter().map(|url| url.to_string()).collect());
    save_market_urls(&mut err, &market_urls);
    check_manifest(&mut err, MANIFEST_NAME, data.as_bytes());
    err
}

/// Validates a packaged app, either a zip file or an unpacked directory.
pub fn validate_packaged_app(path: impl AsRef<Path>, config: &ValidatorConfig) -> ErrorBundle {
    let mut err = ErrorBundle::new(config.listed);
    err.save_resource("packaged", true);
    save_market_urls(&mut err, &config.market_urls);
    driver::test_package(&mut err, path.as_ref(), config);
    err
}

/// Fetches the manifest of a hosted app and validates it.
pub fn validate_hosted_app(url: &str, config: &ValidatorConfig) -> ErrorBundle {
    let mut err = ErrorBundle::new(config.listed);
    save_market_urls(&mut err, &config.market_urls);

    let fetched = Url::parse(url).map_err(ValidatorError::from).and_then(|url| {
        testcases::resources::fetch_document(&url, config)
    });
    match fetched {
        Ok(data) => check_manifest(&mut err, url, &data),
        Err(e) => {
            log::error!("Could not fetch {}: {}", url, e);
            err.error(
                Diagnostic::new(["main", "prepare_package", "fetch_failed"], "The manifest could not be retrieved")
                    .description(vec![format!("The manifest at {} could not be retrieved.", url), e.to_string()])
                    .file(url),
            );
        }
    }
    err
}

/// Whether `package` names a hosted manifest rather than a file.
pub fn is_remote(package: &str) -> bool {
    Url::parse(package).map_or(false, |url| matches!(url.scheme(), "http" | "https"))
}

fn save_market_urls(err: &mut ErrorBundle, market_urls: &[String]) {
    let urls: Vec<Value> = market_urls.iter().cloned().map(Value::String).collect();
    err.save_resource("market_urls", urls);
}

fn check_manifest(err: &mut ErrorBundle, file: &str, data: &[u8]) {
    if let Some(manifest) = detect_webapp_string(err, file, data) {
        testcases::webappbase::check_permissions(err, &manifest);
        testcases::locales::check_locales(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.com/manifest.webapp"));
        assert!(!is_remote("app.zip"));
        assert!(!is_remote("/tmp/app.zip"));
        assert!(!is_remote("C:\\apps\\app.zip"));
    }

    #[test]
    fn test_market_urls_resource() {
        let err = validate_app("{}", true, Some(vec!["https://store.example.com".to_string()]));
        assert_eq!(err.get_resource("market_urls"), Some(&serde_json::json!(["https://store.example.com"])));
    }
}
