//! Locale support checks against the languages the Marketplace serves.

use std::collections::BTreeSet;

use appvalidator_report::{Diagnostic, ErrorBundle};
use lazy_static::lazy_static;
use serde_json::Value;

use crate::driver::PackageRun;
use crate::error::Result;
use crate::webapp::MANIFEST_NAME;

const SUPPORTED_LANGUAGES: &[&str] = &[
    "bg", "bn-BD", "ca", "cs", "da", "de", "el", "en-US", "es", "eu", "fr", "ga-IE", "hr", "hu", "it", "ja", "ko",
    "mk", "nb-NO", "nl", "pl", "pt-BR", "ro", "ru", "sk", "sq", "sr", "sr-Latn", "sv-SE", "tr", "zh-CN", "zh-TW",
];

/// Served, but not offered in the language picker
const HIDDEN_LANGUAGES: &[&str] =
    &["af", "ar", "fa", "fi", "he", "id", "mn", "pt-PT", "sl", "th", "uk", "vi", "zu"];

const SHORTER_LANGUAGES: &[(&str, &str)] =
    &[("en", "en-US"), ("ga", "ga-IE"), ("pt", "pt-PT"), ("sv", "sv-SE"), ("zh", "zh-CN")];

lazy_static! {
    static ref ALL_SUPPORTED_LANGUAGES: BTreeSet<&'static str> =
        SUPPORTED_LANGUAGES.iter().chain(HIDDEN_LANGUAGES).copied().collect();
}

pub fn is_supported(locale: &str) -> bool {
    ALL_SUPPORTED_LANGUAGES.contains(canonicalize(locale).as_str())
}

/// Fixes the capitalization of a `lang-REGION` code and maps it onto the
/// closest supported code.
pub fn canonicalize(locale: &str) -> String {
    let (language, region) = locale.split_once('-').unwrap_or((locale, ""));
    let language = language.to_lowercase();
    let canonical = format!("{}-{}", language, region.to_uppercase());

    if ALL_SUPPORTED_LANGUAGES.contains(canonical.as_str()) {
        return canonical;
    }
    if ALL_SUPPORTED_LANGUAGES.contains(language.as_str()) {
        return language;
    }
    if let Some((_, longer)) = SHORTER_LANGUAGES.iter().find(|(short, _)| *short == language) {
        return longer.to_string();
    }
    canonical
}

/// Tier 2: `default_locale` and the `locales` keys must be served.
pub fn validate_locales(err: &mut ErrorBundle, _run: &mut PackageRun<'_>) -> Result<()> {
    check_locales(err);
    Ok(())
}

/// Checks the locales of the saved `manifest` resource. Skipped when the
/// bundle has already failed.
pub fn check_locales(err: &mut ErrorBundle) {
    if err.failed(false) {
        return;
    }
    let Some(manifest) = err.get_resource("manifest").cloned() else {
        return;
    };

    let mut locales = BTreeSet::new();
    if let Some(default_locale) = manifest.get("default_locale").and_then(Value::as_str) {
        locales.insert(default_locale.to_string());
        if !is_supported(default_locale) {
            err.error(
                Diagnostic::new(["webapp", "default_locale", "not_supported"], "Unsupported default_locale provided.")
                    .description(vec![
                        "The default_locale provided in the manifest is not supported by the Firefox Marketplace. \
                         If a default_locale is provided, it must be be a supported one."
                            .to_string(),
                        format!("Provided default_locale: {}", default_locale),
                    ])
                    .file(MANIFEST_NAME),
            );
        }
    }
    if let Some(map) = manifest.get("locales").and_then(Value::as_object) {
        locales.extend(map.keys().cloned());
    }

    err.save_resource("locales", locales.iter().cloned().map(Value::String).collect::<Vec<_>>());
    if locales.is_empty() {
        return;
    }

    let underscored: Vec<&str> = locales.iter().map(String::as_str).filter(|l| l.contains('_')).collect();
    if !underscored.is_empty() {
        err.warning(
            Diagnostic::new(["webapp", "locales", "probably_wrong"], "Potentially invalid locale used.")
                .description(vec![
                    "A locale was detected that doesn't appear to be valid. Locales should be in the form of \
                     `xx-YY`. Hyphens should be used, not underscores."
                        .to_string(),
                    format!("Locales: {}", underscored.join(", ")),
                ])
                .file(MANIFEST_NAME),
        );
    }

    let unsupported: Vec<&str> = locales.iter().map(String::as_str).filter(|l| !is_supported(l)).collect();
    if unsupported.len() == locales.len() {
        err.error(
            Diagnostic::new(["webapp", "locales", "none_supported"], "No supported locales provided.")
                .description(vec![
                    "None of the locales provided in the manifest are supported by the Firefox Marketplace. \
                     At least one supported locale must be provided in the manifest."
                        .to_string(),
                    format!("Provided locales: {}", unsupported.join(", ")),
                ])
                .file(MANIFEST_NAME),
        );
        return;
    }
    if !unsupported.is_empty() {
        err.warning(
            Diagnostic::new(["webapp", "locales", "not_supported"], "Unsupported locale provided.")
                .description(vec![
                    "A locale which is not supported by the Firefox Marketplace was specified in the manifest. \
                     The information listed in this locale will not be stored or displayed to users."
                        .to_string(),
                    format!("Unsupported locales: {}", unsupported.join(", ")),
                ])
                .file(MANIFEST_NAME),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn check(manifest: Value) -> ErrorBundle {
        let mut err = ErrorBundle::new(true);
        err.save_resource("manifest", manifest);
        check_locales(&mut err);
        err
    }

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize("en-us"), "en-US");
        assert_eq!(canonicalize("EN"), "en-US");
        assert_eq!(canonicalize("de-DE"), "de");
        assert_eq!(canonicalize("pt"), "pt-PT");
        assert_eq!(canonicalize("xx"), "xx-");
        assert_eq!(canonicalize("sr-latn"), "sr");
    }

    #[test]
    fn test_supported_locales() {
        let err = check(json!({"default_locale": "en", "locales": {"fr": {}, "pt-BR": {}, "fi": {}}}));
        assert_eq!(err.messages().count(), 0);
        assert_eq!(err.get_resource("locales"), Some(&json!(["en", "fi", "fr", "pt-BR"])));
    }

    #[test]
    fn test_unsupported_default_locale() {
        let err = check(json!({"default_locale": "tlh", "locales": {"fr": {}}}));
        assert!(err.has_message(&["webapp", "default_locale", "not_supported"]));
        assert!(err.has_message(&["webapp", "locales", "not_supported"]));
        assert!(!err.has_message(&["webapp", "locales", "none_supported"]));
    }

    #[test]
    fn test_none_supported() {
        let err = check(json!({"locales": {"tlh": {}, "qya": {}}}));
        assert_eq!(err.errors().len(), 1);
        assert!(err.has_message(&["webapp", "locales", "none_supported"]));
        assert_eq!(err.warnings().len(), 0);
    }

    #[test]
    fn test_underscores() {
        let err = check(json!({"default_locale": "en", "locales": {"en_US": {}}}));
        assert!(err.has_message(&["webapp", "locales", "probably_wrong"]));
        assert!(err.has_message(&["webapp", "locales", "not_supported"]));
    }

    #[test]
    fn test_skipped_after_failure() {
        let mut err = ErrorBundle::new(true);
        err.error(Diagnostic::new(["x"], "x"));
        err.save_resource("manifest", json!({"default_locale": "tlh"}));
        check_locales(&mut err);
        assert_eq!(err.errors().len(), 1);
        assert!(!err.has_resource("locales"));
    }
}
