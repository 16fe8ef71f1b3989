#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(manifest) = std::str::from_utf8(data) {
        // Both marketplace modes walk different schema branches.
        let _ = appvalidator::validate_app(manifest, true, None);
        let _ = appvalidator::validate_app(manifest, false, None);
    }
});
