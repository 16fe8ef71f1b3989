#![no_main]

use appvalidator::markup::{test_css_file, test_css_snippet};
use appvalidator_report::{ErrorBundle, FileRef};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(css) = std::str::from_utf8(data) {
        if css.len() > 10_000 {
            return;
        }

        let file = FileRef::from("fuzz.css");
        let mut err = ErrorBundle::new(true);
        test_css_file(&mut err, &file, css, 1);
        test_css_snippet(&mut err, &file, css, 1);
    }
});
