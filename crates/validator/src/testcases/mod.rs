//! The registered package tests, grouped by concern.

pub mod content;
pub mod locales;
pub mod packagelayout;
pub mod resources;
pub mod webappbase;

use crate::config::ValidatorConfig;
use crate::driver::RegisteredTest;

/// Every test a run of `config` performs, in registration order.
pub fn tests(config: &ValidatorConfig) -> Vec<RegisteredTest> {
    let mut tests = vec![
        RegisteredTest { tier: 1, name: "test_app_manifest", run: webappbase::test_app_manifest },
        RegisteredTest { tier: 1, name: "test_layout_all", run: packagelayout::test_layout_all },
        RegisteredTest { tier: 1, name: "test_blacklisted_files", run: packagelayout::test_blacklisted_files },
        RegisteredTest { tier: 2, name: "test_manifest_spec", run: webappbase::test_manifest_spec },
        RegisteredTest { tier: 2, name: "test_permissions", run: webappbase::test_permissions },
        RegisteredTest { tier: 2, name: "validate_locales", run: locales::validate_locales },
        RegisteredTest { tier: 2, name: "test_packed_packages", run: content::test_packed_packages },
    ];
    if config.fetch_resources {
        tests.push(RegisteredTest { tier: 4, name: "test_resources", run: resources::test_resources });
    }
    tests
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_tier_is_opt_in() {
        let config = ValidatorConfig::default();
        assert!(tests(&config).iter().all(|test| test.tier < 4));

        let config = ValidatorConfig { fetch_resources: true, ..ValidatorConfig::default() };
        assert_eq!(tests(&config).last().map(|test| test.name), Some("test_resources"));
    }
}
