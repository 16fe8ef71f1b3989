//! Manifest detection: decode, parse and validate `manifest.webapp`.

use appvalidator_report::{Diagnostic, ErrorBundle};
use appvalidator_spec::{check_name_truncation, WebappSpec};
use serde_json::Value;

use crate::unicode;

/// Where packaged apps keep their manifest
pub const MANIFEST_NAME: &str = "manifest.webapp";

/// Decodes and parses manifest bytes, reporting a parse error on failure.
pub fn parse_manifest(err: &mut ErrorBundle, file: &str, data: &[u8]) -> Option<Value> {
    let text = unicode::decode(data);
    match serde_json::from_str::<Value>(&text) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            log::debug!("Manifest {:?} is not JSON: {}", file, e);
            err.error(
                Diagnostic::new(["webapp", "detect_webapp", "parse_error"], "JSON Parse Error")
                    .description(vec![
                        "The webapp extension could not be parsed due to a syntax error in the JSON.".to_string(),
                        e.to_string(),
                    ])
                    .file(file),
            );
            None
        }
    }
}

/// Runs the manifest schema and the name-length check over a parsed
/// manifest. The manifest is saved as the `manifest` resource when the
/// bundle is still clean afterwards.
pub fn validate_manifest(err: &mut ErrorBundle, manifest: &Value) {
    WebappSpec::for_bundle(err).validate(err, manifest);
    check_name_truncation(err, manifest);

    if !err.failed(false) {
        err.save_resource("manifest", manifest.clone());
    }
}

/// Parses and validates the text of a manifest in one step.
pub fn detect_webapp_string(err: &mut ErrorBundle, file: &str, data: &[u8]) -> Option<Value> {
    let manifest = parse_manifest(err, file, data)?;
    validate_manifest(err, &manifest);
    Some(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const MINIMAL: &str = r#"{"name":"X","description":"D","developer":{"name":"Y"}}"#;

    #[test]
    fn test_parse_error() {
        let mut err = ErrorBundle::new(false);
        assert_eq!(detect_webapp_string(&mut err, MANIFEST_NAME, b"{\"name\": }"), None);
        assert!(err.has_message(&["webapp", "detect_webapp", "parse_error"]));
        assert!(!err.has_resource("manifest"));
    }

    #[test]
    fn test_valid_manifest_is_saved() {
        let mut err = ErrorBundle::new(false);
        let manifest = detect_webapp_string(&mut err, MANIFEST_NAME, MINIMAL.as_bytes()).unwrap();
        assert!(err.errors().is_empty());
        assert_eq!(err.get_resource("manifest"), Some(&manifest));
    }

    #[test]
    fn test_bom_is_tolerated() {
        let mut err = ErrorBundle::new(false);
        let mut data = b"\xEF\xBB\xBF".to_vec();
        data.extend_from_slice(MINIMAL.as_bytes());
        assert!(detect_webapp_string(&mut err, MANIFEST_NAME, &data).is_some());
        assert!(err.errors().is_empty());
    }

    #[test]
    fn test_invalid_manifest_is_not_saved() {
        let mut err = ErrorBundle::new(false);
        detect_webapp_string(&mut err, MANIFEST_NAME, br#"{"name":"X"}"#);
        assert!(err.failed(false));
        assert!(!err.has_resource("manifest"));
    }

    #[test]
    fn test_long_name_warns() {
        let mut err = ErrorBundle::new(false);
        let data = r#"{"name":"A very long app name","description":"D","developer":{"name":"Y"}}"#;
        detect_webapp_string(&mut err, MANIFEST_NAME, data.as_bytes());
        assert!(err.has_message(&["webapp", "b2g", "name_truncated"]));
        assert!(err.has_resource("manifest"));
    }
}
