//! The content walk: flags junk files and hands every stylesheet, script
//! and document to its checker.

use std::time::Instant;

use appvalidator_js::{test_js_file, JsParser};
use appvalidator_report::{Diagnostic, ErrorBundle, FileRef};

use crate::config::ValidatorConfig;
use crate::driver::{check_deadline, PackageRun};
use crate::error::Result;
use crate::markup::{test_css_file, MarkupTester};
use crate::package::{extension, is_dir_entry, Package};
use crate::unicode;

const FLAGGED_FILES: &[&str] = &[".DS_Store", "Thumbs.db"];
const FLAGGED_EXTENSIONS: &[&str] = &[".orig", ".old", ".tmp", "~"];

/// Bytes of hidden and flagged files tolerated before warning
pub const MAX_GARBAGE: u64 = 100 * 1024;

/// Packages nested deeper than this are not opened.
const MAX_NESTING: usize = 3;

struct Walk<'r> {
    config: &'r ValidatorConfig,
    parser: &'r dyn JsParser,
    deadline: Option<Instant>,
    garbage: u64,
    processed: usize,
}

/// Tier 2: walks every entry of the package, and of packages nested in it.
pub fn test_packed_packages(err: &mut ErrorBundle, run: &mut PackageRun<'_>) -> Result<()> {
    let config = run.config;
    let deadline = run.deadline();
    let (package, parser) = run.package_and_parser();
    let mut walk = Walk { config, parser, deadline, garbage: 0, processed: 0 };

    walk.package(err, package, &[])?;
    log::info!("Processed {} files", walk.processed);

    if walk.garbage > MAX_GARBAGE {
        err.warning(
            Diagnostic::new(["testcases_content", "garbage", "too_much_garbage"], "Too much garbage in package")
                .description(vec![
                    "Your app contains too many unused or garbage files. These include temporary files, \
                     'dot files', IDE and editor backup and configuration, and operating system hidden files."
                        .to_string(),
                    format!("{} bytes of garbage found.", walk.garbage),
                ]),
        );
    }
    Ok(())
}

impl Walk<'_> {
    fn package(&mut self, err: &mut ErrorBundle, package: &mut Package, parents: &[String]) -> Result<()> {
        let entries = package.entries().to_vec();
        for name in &entries {
            check_deadline(self.deadline, self.config)?;
            if is_dir_entry(name) {
                continue;
            }
            let file = file_ref(parents, name);
            let leaf = name.rsplit('/').next().unwrap_or(name);

            if name.contains("__MACOSX") || leaf.starts_with('.') {
                err.warning(
                    Diagnostic::new(
                        ["testcases_content", "test_packed_packages", "hidden_files"],
                        "Hidden files and folders flagged",
                    )
                    .description(
                        "Hidden files and folders complicate the review process and can contain sensitive \
                         information about the system that generated the package. Please modify the packaging \
                         process so that these files aren't included.",
                    )
                    .file(&file),
                );
                self.count_garbage(package, name);
                continue;
            }
            if FLAGGED_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) || FLAGGED_FILES.contains(&leaf) {
                err.warning(
                    Diagnostic::new(
                        ["testcases_content", "test_packaged_packages", "flagged_files"],
                        "Flagged filename found",
                    )
                    .description(
                        "Files were found that are either unnecessary or have been included unintentionally. \
                         They should be removed.",
                    )
                    .file(&file),
                );
                self.count_garbage(package, name);
                continue;
            }

            let extension = extension(name);
            if !matches!(extension.as_str(), "css" | "js" | "xml" | "html" | "xhtml" | "jar" | "zip") {
                continue;
            }
            let data = match package.read(name) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("Could not read {}: {}", file, e);
                    continue;
                }
            };
            if data.is_empty() {
                continue;
            }
            self.processed += 1;
            log::debug!("Processing {}", file);

            match extension.as_str() {
                "jar" | "zip" => self.nested(err, parents, name, data)?,
                "css" => test_css_file(err, &file, &unicode::decode(&data), 1),
                "js" => {
                    let markup = MarkupTester::new(self.parser, self.deadline);
                    test_js_file(err, file, &unicode::decode(&data), 0, None, &markup.script_options());
                }
                _ => {
                    let markup = MarkupTester::new(self.parser, self.deadline);
                    markup.process(err, &file, &unicode::decode(&data), &extension);
                }
            }
        }
        Ok(())
    }

    fn nested(&mut self, err: &mut ErrorBundle, parents: &[String], name: &str, data: Vec<u8>) -> Result<()> {
        if parents.len() >= MAX_NESTING {
            log::warn!("Not opening {}: packages nested too deeply", name);
            return Ok(());
        }
        let mut inner = match Package::from_bytes(name, data) {
            Ok(inner) => inner,
            Err(e) => {
                err.warning(
                    Diagnostic::new(
                        ["testcases_content", "test_packed_packages", "jar_subpackage_corrupt"],
                        "Subpackage corrupt",
                    )
                    .description(vec![
                        "The subpackage could not be opened due to issues with corruption.".to_string(),
                        e.to_string(),
                    ])
                    .file(file_ref(parents, name)),
                );
                return Ok(());
            }
        };
        let mut path = parents.to_vec();
        path.push(name.to_string());
        self.package(err, &mut inner, &path)
    }

    fn count_garbage(&mut self, package: &mut Package, name: &str) {
        match package.entry_size(name) {
            Ok(size) => self.garbage += size,
            Err(e) => log::warn!("Could not size {}: {}", name, e),
        }
    }
}

fn file_ref(parents: &[String], name: &str) -> FileRef {
    if parents.is_empty() {
        return FileRef::from(name);
    }
    let mut path = parents.to_vec();
    path.push(name.to_string());
    FileRef::from(path)
}
