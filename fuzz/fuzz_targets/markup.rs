#![no_main]

use appvalidator::markup::MarkupTester;
use appvalidator_js::BuiltinParser;
use appvalidator_report::{ErrorBundle, FileRef};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Flavor {
    Html,
    Xhtml,
    Xml,
}

#[derive(Arbitrary, Debug)]
struct Input {
    flavor: Flavor,
    lenient: bool,
    document: String,
}

fuzz_target!(|input: Input| {
    let extension = match input.flavor {
        Flavor::Html => "html",
        Flavor::Xhtml => "xhtml",
        Flavor::Xml => "xml",
    };
    let mut tester = MarkupTester::new(&BuiltinParser, None);
    if input.lenient {
        tester = tester.lenient();
    }

    let mut err = ErrorBundle::new(true);
    tester.process(&mut err, &FileRef::from("fuzz.html"), &input.document, extension);
});
