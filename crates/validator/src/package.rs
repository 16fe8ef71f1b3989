//! Read access to an app package, either a zip archive or an unpacked
//! directory.

use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::{Result, ValidatorError};

enum Source {
    Zip(ZipArchive<Cursor<Vec<u8>>>),
    Dir(PathBuf),
}

/// An opened package. Entry names use `/` separators and keep the order
/// (and any duplicates) of the underlying archive.
pub struct Package {
    name: String,
    source: Source,
    entries: Vec<String>,
    size: u64,
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("entries", &self.entries.len())
            .field("size", &self.size)
            .finish()
    }
}

impl Package {
    /// Opens a zip file, or walks a directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        if path.is_dir() {
            let mut entries = Vec::new();
            let mut size = 0;
            walk_dir(path, path, &mut entries, &mut size)?;
            log::debug!("Opened directory package {} ({} entries)", name, entries.len());
            return Ok(Self { name, source: Source::Dir(path.to_path_buf()), entries, size });
        }

        Self::from_bytes(name, fs::read(path)?)
    }

    /// Opens an in-memory zip archive, such as a jar nested in a package.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        let name = name.into();
        let size = data.len() as u64;
        let mut archive = ZipArchive::new(Cursor::new(data))?;

        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            entries.push(archive.by_index(index)?.name().to_string());
        }
        log::debug!("Opened zip package {} ({} entries)", name, entries.len());
        Ok(Self { name, source: Source::Zip(archive), entries, size })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every entry, in archive order, duplicates included
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry == name)
    }

    /// Total size of the package in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Uncompressed size of one entry
    pub fn entry_size(&mut self, name: &str) -> Result<u64> {
        match &mut self.source {
            Source::Zip(archive) => Ok(archive.by_name(name)?.size()),
            Source::Dir(root) => Ok(fs::metadata(root.join(name))?.len()),
        }
    }

    /// Reads a whole entry
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        self.read_limited(name, u64::MAX)
    }

    /// Reads at most `limit` bytes from the start of an entry
    pub fn read_prefix(&mut self, name: &str, limit: usize) -> Result<Vec<u8>> {
        self.read_limited(name, limit as u64)
    }

    fn read_limited(&mut self, name: &str, limit: u64) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        match &mut self.source {
            Source::Zip(archive) => {
                let file = archive.by_name(name)?;
                file.take(limit).read_to_end(&mut data)?;
            }
            Source::Dir(root) => {
                if name.split('/').any(|segment| segment == "..") {
                    return Err(ValidatorError::Resource(format!("{} escapes the package", name)));
                }
                let file = fs::File::open(root.join(name))?;
                file.take(limit).read_to_end(&mut data)?;
            }
        }
        Ok(data)
    }
}

/// Whether an entry names a directory rather than a file
pub fn is_dir_entry(name: &str) -> bool {
    name.ends_with('/')
}

/// Lower-cased extension of an entry name, without the dot
pub fn extension(name: &str) -> String {
    let leaf = name.rsplit('/').next().unwrap_or(name);
    match leaf.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

fn walk_dir(root: &Path, dir: &Path, entries: &mut Vec<String>, size: &mut u64) -> Result<()> {
    let mut children = fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    children.sort_by_key(|child| child.file_name());

    for child in children {
        let path = child.path();
        let file_type = child.file_type()?;
        if file_type.is_dir() {
            walk_dir(root, &path, entries, size)?;
        } else if file_type.is_file() {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            *size += child.metadata()?.len();
            entries.push(name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use zip::write::FileOptions;

    fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_zip_entries_and_reads() {
        let data = zip_bytes(&[("manifest.webapp", b"{}"), ("js/app.js", b"var x = 1;")]);
        let mut package = Package::from_bytes("app.zip", data).unwrap();

        assert_eq!(package.entries(), &["manifest.webapp".to_string(), "js/app.js".to_string()]);
        assert!(package.contains("js/app.js"));
        assert_eq!(package.read("js/app.js").unwrap(), b"var x = 1;");
        assert_eq!(package.read_prefix("js/app.js", 3).unwrap(), b"var");
        assert!(package.read("missing.js").is_err());
    }

    #[test]
    fn test_corrupt_zip() {
        let result = Package::from_bytes("bad.zip", b"not a zip".to_vec());
        assert!(matches!(result, Err(ValidatorError::Zip(_))));
    }

    #[test]
    fn test_directory_package() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("js")).unwrap();
        fs::write(dir.path().join("manifest.webapp"), "{}").unwrap();
        fs::write(dir.path().join("js/app.js"), "var x;").unwrap();

        let mut package = Package::open(dir.path()).unwrap();
        assert_eq!(package.entries(), &["js/app.js".to_string(), "manifest.webapp".to_string()]);
        assert_eq!(package.size(), 8);
        assert_eq!(package.read("manifest.webapp").unwrap(), b"{}");
        assert!(package.read("../secret").is_err());
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("a/b/Script.JS"), "js");
        assert_eq!(extension("a.b/noext"), "");
        assert_eq!(extension(".hidden"), "");
        assert!(is_dir_entry("a/"));
    }
}
