//! The tiered pipeline for packaged apps.
//!
//! Tests are registered against a tier. Tiers run in ascending order and
//! tests within a tier run in registration order. Unless the bundle is in
//! determined mode, the first tier that leaves an error behind ends the
//! run and later-tier messages are discarded.

use std::path::Path;
use std::time::Instant;

use appvalidator_js::JsParser;
use appvalidator_report::{Diagnostic, ErrorBundle};
use log::{error, info};
use serde_json::Value;

use crate::config::ValidatorConfig;
use crate::error::{Result, ValidatorError};
use crate::package::Package;
use crate::testcases;

/// A test over a package
pub type TestFn = fn(&mut ErrorBundle, &mut PackageRun<'_>) -> Result<()>;

#[derive(Clone, Copy)]
pub struct RegisteredTest {
    pub tier: u8,
    pub name: &'static str,
    pub run: TestFn,
}

impl std::fmt::Debug for RegisteredTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTest").field("tier", &self.tier).field("name", &self.name).finish()
    }
}

/// State the tests of one run share
pub struct PackageRun<'a> {
    pub config: &'a ValidatorConfig,
    pub package: Package,
    /// The parsed manifest, valid or not
    pub manifest: Option<Value>,
    parser: Box<dyn JsParser>,
    deadline: Option<Instant>,
}

impl<'a> PackageRun<'a> {
    pub fn new(config: &'a ValidatorConfig, package: Package, start: Instant) -> Self {
        Self {
            config,
            package,
            manifest: None,
            parser: config.js_backend.parser(),
            deadline: config.deadline_from(start),
        }
    }

    pub fn parser(&self) -> &dyn JsParser {
        self.parser.as_ref()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Borrows the package for reading alongside the script parser.
    pub fn package_and_parser(&mut self) -> (&mut Package, &dyn JsParser) {
        (&mut self.package, self.parser.as_ref())
    }

    /// Fails once the wall-clock guard has elapsed.
    pub fn check_deadline(&self) -> Result<()> {
        check_deadline(self.deadline, self.config)
    }
}

/// Fails if `deadline` has passed.
pub fn check_deadline(deadline: Option<Instant>, config: &ValidatorConfig) -> Result<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => {
            Err(ValidatorError::ValidationTimeout { seconds: config.timeout_secs() })
        }
        _ => Ok(()),
    }
}

/// Runs `tests` tier by tier.
pub fn run_tests(err: &mut ErrorBundle, run: &mut PackageRun<'_>, tests: &[RegisteredTest]) -> Result<()> {
    let mut tiers: Vec<u8> = tests.iter().map(|test| test.tier).collect();
    tiers.sort_unstable();
    tiers.dedup();

    for tier in tiers {
        info!("Running tier {}", tier);
        err.set_tier(tier);

        for test in tests.iter().filter(|test| test.tier == tier) {
            run.check_deadline()?;
            info!("Running test {}", test.name);
            (test.run)(err, run)?;
        }

        if err.failed(false) && !err.determined {
            info!("Tier {} failed; stopping", tier);
            err.unfinished = true;
            err.discard_unused_messages(tier);
            break;
        }
    }
    Ok(())
}

/// Opens the package at `path` and runs every registered test over it.
pub fn test_package(err: &mut ErrorBundle, path: &Path, config: &ValidatorConfig) {
    let start = Instant::now();
    err.determined = config.determined;

    if !path.exists() {
        err.error(Diagnostic::new(["main", "prepare_package", "not_found"], "The package could not be found"));
        return;
    }

    let package = match Package::open(path) {
        Ok(package) => package,
        Err(ValidatorError::Zip(e)) => {
            info!("Corrupt package {}: {}", path.display(), e);
            err.error(
                Diagnostic::new(["submain", "_load_install_rdf", "badzipfile"], "Corrupt ZIP file")
                    .description("We were unable to decompress the zip file."),
            );
            return;
        }
        Err(e) => {
            err.error(
                Diagnostic::new(["main", "test_package", "unopenable"], "The package could not be opened.")
                    .description(e.to_string()),
            );
            return;
        }
    };
    info!("Validating {} ({} bytes)", package.name(), package.size());

    let tests = testcases::tests(config);
    let mut run = PackageRun::new(config, package, start);
    match run_tests(err, &mut run, &tests) {
        Ok(()) => {}
        Err(e) if e.is_timeout() => {
            error!("{}; Package: {}", e, path.display());
            err.error(
                Diagnostic::new(["main", "test_package", "timeout"], "Validation timed out").description(vec![
                    "The validation process took too long to complete. Contact an editor for more information."
                        .to_string(),
                    e.to_string(),
                ]),
            );
            err.unfinished = true;
        }
        Err(e) => {
            error!("Validation of {} stopped: {}", path.display(), e);
            err.error(
                Diagnostic::new(["main", "test_package", "unexpected_error"], "Validation could not complete")
                    .description(e.to_string()),
            );
            err.unfinished = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn pass(_: &mut ErrorBundle, _: &mut PackageRun<'_>) -> Result<()> {
        Ok(())
    }

    fn fail(err: &mut ErrorBundle, _: &mut PackageRun<'_>) -> Result<()> {
        err.error(Diagnostic::new(["test", "fail"], "failed"));
        Ok(())
    }

    fn warn_late(err: &mut ErrorBundle, _: &mut PackageRun<'_>) -> Result<()> {
        err.warning(Diagnostic::new(["test", "late"], "late"));
        Ok(())
    }

    fn empty_package() -> Package {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        Package::open(dir.path()).unwrap()
    }

    #[test]
    fn test_tiers_run_in_order() {
        let config = ValidatorConfig::default();
        let mut err = ErrorBundle::new(true);
        let mut run = PackageRun::new(&config, empty_package(), Instant::now());
        let tests = [
            RegisteredTest { tier: 3, name: "late", run: warn_late },
            RegisteredTest { tier: 1, name: "fail", run: fail },
        ];
        run_tests(&mut err, &mut run, &tests).unwrap();
        assert_eq!(err.ending_tier(), 3);
        assert_eq!(err.messages().count(), 2);
        assert!(!err.unfinished);
    }

    #[test]
    fn test_undetermined_runs_stop_at_the_failing_tier() {
        let config = ValidatorConfig::default();
        let mut err = ErrorBundle::new(true);
        err.determined = false;
        let mut run = PackageRun::new(&config, empty_package(), Instant::now());
        let tests = [
            RegisteredTest { tier: 1, name: "pass", run: pass },
            RegisteredTest { tier: 2, name: "fail", run: fail },
            RegisteredTest { tier: 3, name: "late", run: warn_late },
        ];
        run_tests(&mut err, &mut run, &tests).unwrap();
        assert!(err.unfinished);
        assert_eq!(err.ending_tier(), 2);
        assert!(!err.has_message(&["test", "late"]));
    }

    #[test]
    fn test_elapsed_deadline() {
        let config = ValidatorConfig { timeout: Some(Duration::from_secs(1)), ..ValidatorConfig::default() };
        let mut err = ErrorBundle::new(true);
        let started = Instant::now() - Duration::from_secs(5);
        let mut run = PackageRun::new(&config, empty_package(), started);
        let tests = [RegisteredTest { tier: 1, name: "pass", run: pass }];
        let result = run_tests(&mut err, &mut run, &tests);
        assert!(matches!(result, Err(ValidatorError::ValidationTimeout { seconds: 1 })));
    }
}
