#![no_main]

use appvalidator_js::{test_js_file, BuiltinParser, ScriptOptions};
use appvalidator_report::ErrorBundle;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        // Limit input size to keep iterations fast
        if source.len() > 20_000 {
            return;
        }

        let mut err = ErrorBundle::new(true);
        let options = ScriptOptions { parser: &BuiltinParser, ..ScriptOptions::default() };
        let _ = test_js_file(&mut err, "fuzz.js", source, 0, None, &options);
    }
});
