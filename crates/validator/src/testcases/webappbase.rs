//! Manifest presence, schema and permission tests.

use appvalidator_report::{Diagnostic, ErrorBundle};
use appvalidator_spec::{allowed_for, ALL_PERMISSIONS};
use serde_json::Value;

use crate::driver::PackageRun;
use crate::error::Result;
use crate::webapp::{parse_manifest, validate_manifest, MANIFEST_NAME};

const APP_TYPES: &[&str] = &["web", "privileged", "certified"];

/// Tier 1: the package must carry a manifest that parses as JSON.
pub fn test_app_manifest(err: &mut ErrorBundle, run: &mut PackageRun<'_>) -> Result<()> {
    if !run.package.contains(MANIFEST_NAME) {
        err.error(
            Diagnostic::new(["webappbase", "test_app_manifest", "missing_manifest"], "Packaged app missing manifest")
                .description([
                    "All apps must contain an app manifest file.",
                    "Attempted to find a manifest at `/manifest.webapp`, but no file was found.",
                ]),
        );
        return Ok(());
    }

    let data = run.package.read(MANIFEST_NAME)?;
    run.manifest = parse_manifest(err, MANIFEST_NAME, &data);
    Ok(())
}

/// Tier 2: the parsed manifest against the manifest schema.
pub fn test_manifest_spec(err: &mut ErrorBundle, run: &mut PackageRun<'_>) -> Result<()> {
    if let Some(manifest) = &run.manifest {
        validate_manifest(err, manifest);
    }
    Ok(())
}

/// Tier 2: requested permissions against the app type.
pub fn test_permissions(err: &mut ErrorBundle, run: &mut PackageRun<'_>) -> Result<()> {
    if let Some(manifest) = &run.manifest {
        check_permissions(err, manifest);
    }
    Ok(())
}

/// The app type a manifest declares. Anything unrecognised counts as `web`.
pub fn app_type(manifest: &Value) -> &str {
    manifest
        .get("type")
        .and_then(Value::as_str)
        .filter(|t| APP_TYPES.contains(t))
        .unwrap_or("web")
}

/// Saves the `app_type` resource and reports every known permission the
/// app type may not request. Unknown permission names are left to the
/// schema.
pub fn check_permissions(err: &mut ErrorBundle, manifest: &Value) {
    let app_type = app_type(manifest);
    err.save_resource("app_type", app_type);

    let Some(requested) = manifest.get("permissions").and_then(Value::as_object) else {
        return;
    };
    let allowed = allowed_for(app_type);
    let unauthorized: Vec<&str> = requested
        .keys()
        .map(String::as_str)
        .filter(|p| ALL_PERMISSIONS.contains(*p) && !allowed.contains(*p))
        .collect();
    if unauthorized.is_empty() {
        return;
    }

    log::debug!("{} app requests unauthorized permissions {:?}", app_type, unauthorized);
    err.error(
        Diagnostic::new(["webappbase", "test_permissions", "unauthorized"], "App requested unavailable permission")
            .description(vec![
                format!(
                    "A permission requested by the app is not available for the app's type ({}).",
                    app_type
                ),
                format!("Requested permissions: {}", unauthorized.join(", ")),
            ])
            .file(MANIFEST_NAME),
    );
}
