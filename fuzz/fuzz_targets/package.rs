#![no_main]

use appvalidator::Package;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a zip archive; every entry must be readable or fail cleanly.
    if let Ok(mut package) = Package::from_bytes("fuzz.zip", data.to_vec()) {
        let entries = package.entries().to_vec();
        for name in entries.iter().take(64) {
            let _ = package.read_prefix(name, 4096);
        }
    }
});
