//! Structural checks over the package's entry list.

use std::collections::{BTreeSet, HashSet};

use appvalidator_report::{Diagnostic, ErrorBundle};

use crate::driver::PackageRun;
use crate::error::Result;
use crate::package::{extension, is_dir_entry};

/// Extensions that usually identify binary components
const BLACKLISTED_EXTENSIONS: &[&str] = &["dll", "exe", "dylib", "so", "sh", "class"];

const BLACKLISTED_MAGIC_NUMBERS: &[&[u8]] = &[
    &[0x4d, 0x5a],             // EXE/DLL
    &[0x5a, 0x4d],             // EXE/DLL, alternative
    &[0x7f, 0x45, 0x4c, 0x46], // ELF
    &[0x23, 0x21],             // shebang
    &[0xca, 0xfe, 0xba, 0xbe], // Java class, Mach-O fat binary
    &[0xca, 0xfe, 0xd0, 0x0d], // packed Java
    &[0xfe, 0xed, 0xfa, 0xce], // Mach-O
    &[0x46, 0x57, 0x53],       // uncompressed SWF
    &[0x43, 0x57, 0x53],       // zlib SWF
];

/// More `.class` files than this make the package a Java archive.
const JAVA_JAR_THRESHOLD: usize = 10;

const VCS_DIRS: &[&str] = &[".git", ".svn"];

/// Tier 1: duplicate entries, `META-INF/`, padded names and VCS folders.
pub fn test_layout_all(err: &mut ErrorBundle, run: &mut PackageRun<'_>) -> Result<()> {
    let entries = run.package.entries();

    let mut seen = HashSet::new();
    if entries.iter().any(|entry| !seen.insert(entry.as_str())) {
        err.error(
            Diagnostic::new(
                ["testcases_packagelayout", "test_layout_all", "duplicate_entries"],
                "Package contains duplicate entries",
            )
            .description(
                "The package contains multiple entries with the same name. This practice has been banned. \
                 Try unzipping and re-zipping your app package and try again.",
            ),
        );
    }

    let meta_inf: Vec<&str> =
        entries.iter().map(String::as_str).filter(|entry| entry.starts_with("META-INF/")).collect();
    if !meta_inf.is_empty() {
        err.error(
            Diagnostic::new(["packagelayout", "meta_inf"], "Package contains a META-INF directory")
                .description(vec![
                    "Apps may not ship a `META-INF/` directory; it is reserved for package signatures.".to_string(),
                    format!("Entries: {}", meta_inf.join(", ")),
                ]),
        );
    }

    for entry in entries {
        let padded = entry
            .trim_end_matches('/')
            .split('/')
            .any(|segment| segment.starts_with(' ') || segment.ends_with(' '));
        if padded {
            err.error(
                Diagnostic::new(["packagelayout", "filename_spaces"], "Filename starts or ends with a space")
                    .description(format!("The name {:?} has leading or trailing spaces, which devices reject.", entry))
                    .file(entry),
            );
        }
    }

    let vcs_dirs: BTreeSet<String> = entries.iter().filter_map(|entry| vcs_dir(entry)).collect();
    for dir in vcs_dirs {
        err.error(
            Diagnostic::new(["packagelayout", "vcs_dir"], "Version control directory found")
                .description("Version control folders are not part of the app and must not be packaged.")
                .file(dir),
        );
    }
    Ok(())
}

/// The version control directory an entry lives in, if any.
fn vcs_dir(entry: &str) -> Option<String> {
    let segments: Vec<&str> = entry.split('/').collect();
    // The last segment is a file name, or empty for directory entries.
    let dirs = segments.len() - 1;
    segments[..dirs]
        .iter()
        .position(|segment| VCS_DIRS.contains(segment))
        .map(|index| segments[..=index].join("/") + "/")
}

/// Tier 1: binary extensions and executable magic numbers.
pub fn test_blacklisted_files(err: &mut ErrorBundle, run: &mut PackageRun<'_>) -> Result<()> {
    let entries = run.package.entries().to_vec();
    let mut flagged = Vec::new();

    for name in &entries {
        if is_dir_entry(name) {
            continue;
        }
        if BLACKLISTED_EXTENSIONS.contains(&extension(name).as_str()) {
            err.set_metadata("contains_binary_extension", true);
            flagged.push(name.as_str());
            continue;
        }

        let head = match run.package.read_prefix(name, 4) {
            Ok(head) => head,
            Err(e) => {
                log::warn!("Could not read {}: {}", name, e);
                continue;
            }
        };
        if BLACKLISTED_MAGIC_NUMBERS.iter().any(|magic| head.starts_with(magic)) {
            err.set_metadata("contains_binary_content", true);
            err.warning(
                Diagnostic::new(
                    ["testcases_packagelayout", "test_blacklisted_files", "disallowed_file_type"],
                    "Flagged file type found",
                )
                .description(vec![
                    "A file was found to contain flagged content (i.e.: executable data, potentially \
                     unauthorized scripts, etc.)."
                        .to_string(),
                    format!("The file \"{}\" contains flagged content", name),
                ])
                .file(name),
            );
        }
    }

    if flagged.is_empty() {
        return Ok(());
    }
    let classes = flagged.iter().filter(|name| name.ends_with(".class")).count();
    if classes > JAVA_JAR_THRESHOLD {
        err.notice(
            Diagnostic::new(["testcases_packagelayout", "test_blacklisted_files", "java_jar"], "Java JAR file detected.")
                .description("A Java JAR file was detected in the app.")
                .file(run.package.name()),
        );
    } else {
        err.warning(
            Diagnostic::new(
                ["testcases_packagelayout", "test_blacklisted_files", "disallowed_extension"],
                "Flagged file extensions found.",
            )
            .description(vec![
                "Files whose names end with flagged extensions have been found in the app.".to_string(),
                "The extension of these files are flagged because they usually identify binary components."
                    .to_string(),
                flagged.join("\n"),
            ])
            .file(run.package.name()),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidatorConfig;
    use crate::package::Package;
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Write};
    use std::time::Instant;
    use zip::write::FileOptions;

    fn zip_package(files: &[(&str, &[u8])]) -> Package {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        Package::from_bytes("app.zip", writer.finish().unwrap().into_inner()).unwrap()
    }

    fn run_test(test: crate::driver::TestFn, package: Package) -> ErrorBundle {
        let config = ValidatorConfig::default();
        let mut err = ErrorBundle::new(true);
        let mut run = PackageRun::new(&config, package, Instant::now());
        test(&mut err, &mut run).unwrap();
        err
    }

    #[test]
    fn test_clean_layout() {
        let err = run_test(test_layout_all, zip_package(&[("manifest.webapp", b"{}"), ("img/icon.png", b"png")]));
        assert_eq!(err.messages().count(), 0);
    }

    #[test]
    fn test_meta_inf() {
        let err = run_test(test_layout_all, zip_package(&[("META-INF/zigbert.rsa", b"x"), ("META-INF/manifest.mf", b"x")]));
        assert_eq!(err.errors().len(), 1);
        assert!(err.has_message(&["packagelayout", "meta_inf"]));
    }

    #[test]
    fn test_padded_names() {
        let err = run_test(test_layout_all, zip_package(&[(" index.html", b"x"), ("js /app.js", b"x"), ("ok.js", b"x")]));
        assert_eq!(err.errors().len(), 2);
        assert!(err.has_message(&["packagelayout", "filename_spaces"]));
    }

    #[test]
    fn test_vcs_dirs_are_reported_once() {
        let err = run_test(
            test_layout_all,
            zip_package(&[(".git/config", b"x"), (".git/HEAD", b"x"), ("lib/.svn/entries", b"x"), ("a.git", b"x")]),
        );
        let files: Vec<String> = err.errors().iter().map(|m| m.file.to_string()).collect();
        assert_eq!(files, vec![".git/", "lib/.svn/"]);
    }

    #[test]
    fn test_vcs_dir_of() {
        assert_eq!(vcs_dir(".git/"), Some(".git/".to_string()));
        assert_eq!(vcs_dir("src/.svn/entries"), Some("src/.svn/".to_string()));
        assert_eq!(vcs_dir(".git"), None);
    }

    #[test]
    fn test_magic_numbers() {
        let err = run_test(
            test_blacklisted_files,
            zip_package(&[("run.txt", b"#!/bin/sh\n"), ("data.bin", b"MZ\x90\x00"), ("hello.txt", b"hello")]),
        );
        assert_eq!(err.warnings().len(), 2);
        assert_eq!(err.metadata().get("contains_binary_content"), Some(&serde_json::Value::Bool(true)));
    }

    #[test]
    fn test_blacklisted_extensions() {
        let err = run_test(test_blacklisted_files, zip_package(&[("lib/native.so", b"x"), ("a.DLL", b"x")]));
        assert_eq!(err.warnings().len(), 1);
        assert!(err.has_message(&["testcases_packagelayout", "test_blacklisted_files", "disallowed_extension"]));
        assert!(err.warnings()[0].description.flatten().contains("lib/native.so\na.DLL"));
        assert_eq!(err.metadata().get("contains_binary_extension"), Some(&serde_json::Value::Bool(true)));
    }

    #[test]
    fn test_java_jar() {
        let names: Vec<String> = (0..11).map(|i| format!("com/example/C{}.class", i)).collect();
        let files: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), &b"\xca\xfe\xba\xbe"[..])).collect();
        let err = run_test(test_blacklisted_files, zip_package(&files));
        assert_eq!(err.warnings().len(), 0);
        assert!(err.has_message(&["testcases_packagelayout", "test_blacklisted_files", "java_jar"]));
    }
}
