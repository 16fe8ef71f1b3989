//! Tier 4: fetches the resources a manifest points at and checks icons.
//!
//! Remote targets are fetched concurrently over HTTP. Relative paths are
//! resolved against the configured manifest URL when there is one, and read
//! from the package otherwise.

use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

use appvalidator_report::{Diagnostic, ErrorBundle};
use bytes::{Bytes, BytesMut};
use flate2::read::GzDecoder;
use futures::future::join_all;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde_json::{json, Value};
use url::Url;

use crate::config::ValidatorConfig;
use crate::driver::PackageRun;
use crate::error::{Result, ValidatorError};
use crate::package::Package;

const USER_AGENT: &str = concat!("appvalidator/", env!("CARGO_PKG_VERSION"));
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 5;

/// Where a manifest path leads
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Target {
    Remote(Url),
    Local(String),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Remote(url) => write!(f, "{}", url),
            Target::Local(name) => write!(f, "{}", name),
        }
    }
}

/// What a resource is used for
#[derive(Debug, Clone, PartialEq, Eq)]
enum Purpose {
    Icon { size: String },
    Document(&'static str),
}

pub fn test_resources(err: &mut ErrorBundle, run: &mut PackageRun<'_>) -> Result<()> {
    let Some(manifest) = run.manifest.clone() else {
        return Ok(());
    };
    let config = run.config;
    let base = config.manifest_url.as_deref().map(Url::parse).transpose()?;

    let wanted = collect_targets(&manifest, base.as_ref());
    if wanted.is_empty() {
        return Ok(());
    }

    let remote: Vec<Url> = {
        let mut urls: Vec<Url> = wanted
            .iter()
            .filter_map(|(target, _)| match target {
                Target::Remote(url) => Some(url.clone()),
                Target::Local(_) => None,
            })
            .collect();
        urls.sort();
        urls.dedup();
        urls
    };
    let fetched = fetch_all(&remote, config)?;

    for (target, purpose) in wanted {
        run.check_deadline()?;
        let body = match &target {
            Target::Remote(url) => fetched
                .get(url.as_str())
                .cloned()
                .unwrap_or_else(|| Err(format!("{} was not fetched", url))),
            Target::Local(name) => {
                read_local(&mut run.package, name, config.max_resource_size).map_err(|e| e.to_string())
            }
        };
        record(err, &target, body.as_ref());
        match (body, &purpose) {
            (Err(e), _) => fetch_failed(err, &target, &purpose, &e),
            (Ok(body), Purpose::Icon { size }) => check_icon(err, &target, size, &body),
            (Ok(_), Purpose::Document(_)) => {}
        }
    }
    Ok(())
}

/// The icons, launch path, appcache and developer URL of a manifest.
fn collect_targets(manifest: &Value, base: Option<&Url>) -> Vec<(Target, Purpose)> {
    let mut targets = Vec::new();

    if let Some(icons) = manifest.get("icons").and_then(Value::as_object) {
        for (size, path) in icons {
            if let Some(target) = path.as_str().and_then(|path| resolve(path, base)) {
                targets.push((target, Purpose::Icon { size: size.clone() }));
            }
        }
    }
    for key in ["launch_path", "appcache_path"] {
        if let Some(target) = manifest.get(key).and_then(Value::as_str).and_then(|path| resolve(path, base)) {
            targets.push((target, Purpose::Document(key)));
        }
    }
    // Developer pages live off-package; only absolute URLs are followed.
    if let Some(url) = manifest.pointer("/developer/url").and_then(Value::as_str) {
        if let Ok(url) = Url::parse(url) {
            if matches!(url.scheme(), "http" | "https") {
                targets.push((Target::Remote(url), Purpose::Document("developer")));
            }
        }
    }
    targets
}

fn resolve(path: &str, base: Option<&Url>) -> Option<Target> {
    if path.starts_with("data:") {
        return None;
    }
    if let Ok(url) = Url::parse(path) {
        return matches!(url.scheme(), "http" | "https").then_some(Target::Remote(url));
    }
    match base {
        Some(base) => base.join(path).ok().map(Target::Remote),
        None => Some(Target::Local(path.trim_start_matches('/').to_string())),
    }
}

fn read_local(package: &mut Package, name: &str, limit: usize) -> Result<Bytes> {
    if !package.contains(name) {
        return Err(ValidatorError::Resource(format!("{} is not in the package", name)));
    }
    let data = package.read_prefix(name, limit + 1)?;
    if data.len() > limit {
        return Err(ValidatorError::Resource(format!("{} is larger than {} bytes", name, limit)));
    }
    Ok(Bytes::from(data))
}

type Fetched = BTreeMap<String, std::result::Result<Bytes, String>>;

/// Fetches every URL concurrently, keyed by URL. Failures are kept as
/// their message.
fn fetch_all(urls: &[Url], config: &ValidatorConfig) -> Result<Fetched> {
    if urls.is_empty() {
        return Ok(BTreeMap::new());
    }
    let client = client()?;
    let runtime = tokio::runtime::Runtime::new()?;
    let results = runtime.block_on(join_all(
        urls.iter().map(|url| fetch(&client, url.clone(), config.max_resource_size)),
    ));
    Ok(urls.iter().map(Url::to_string).zip(results.into_iter().map(|r| r.map_err(|e| e.to_string()))).collect())
}

/// Fetches a single document, such as the manifest of a hosted app.
pub fn fetch_document(url: &Url, config: &ValidatorConfig) -> Result<Bytes> {
    let client = client()?;
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(fetch(&client, url.clone(), config.max_resource_size))
}

fn client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .user_agent(USER_AGENT)
        .build()?)
}

async fn fetch(client: &reqwest::Client, url: Url, limit: usize) -> Result<Bytes> {
    log::info!("Fetching {}", url);
    let mut response = client.get(url.clone()).send().await?;
    if !response.status().is_success() {
        return Err(ValidatorError::Resource(format!("{} returned HTTP {}", url, response.status())));
    }

    let mut body = BytesMut::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Err(ValidatorError::Resource(format!("{} is larger than {} bytes", url, limit)));
        }
        body.extend_from_slice(&chunk);
    }
    log::info!("Successfully fetched {} bytes from {}", body.len(), url);
    Ok(body.freeze())
}

/// Adds an entry to the `http_cache` resource, which nested runs inherit.
fn record(err: &mut ErrorBundle, target: &Target, body: std::result::Result<&Bytes, &String>) {
    let Target::Remote(url) = target else { return };
    let cache = err.get_or_create_resource("http_cache", json!({}), true);
    if let Some(cache) = cache.as_object_mut() {
        let entry = match body {
            Ok(body) => json!({"ok": true, "size": body.len()}),
            Err(e) => json!({"ok": false, "error": e}),
        };
        cache.insert(url.to_string(), entry);
    }
}

fn fetch_failed(err: &mut ErrorBundle, target: &Target, purpose: &Purpose, error: &str) {
    let what = match purpose {
        Purpose::Icon { size } => format!("icon ({})", size),
        Purpose::Document(key) => key.to_string(),
    };
    err.error(
        Diagnostic::new(["resources", "fetch", "failed"], "Resource could not be retrieved")
            .description(vec![
                format!("The {} referenced in the manifest could not be retrieved.", what),
                format!("Resource: {}", target),
                error.to_string(),
            ])
            .file(target.to_string()),
    );
}

/// Decodes icon bytes, retrying once through gzip for servers that send
/// compressed bodies without saying so.
fn decode_icon(body: &[u8]) -> Option<(ImageFormat, DynamicImage)> {
    let decode = |data: &[u8]| {
        let format = image::guess_format(data).ok()?;
        let image = image::load_from_memory_with_format(data, format).ok()?;
        Some((format, image))
    };
    decode(body).or_else(|| {
        let mut inflated = Vec::new();
        GzDecoder::new(body).read_to_end(&mut inflated).ok()?;
        decode(&inflated)
    })
}

fn check_icon(err: &mut ErrorBundle, target: &Target, size: &str, body: &[u8]) {
    let decoded = decode_icon(body).filter(|(format, _)| matches!(format, ImageFormat::Png | ImageFormat::Jpeg));
    let Some((_, icon)) = decoded else {
        err.error(
            Diagnostic::new(["resources", "icon", "corrupt"], "Icon could not be opened")
                .description(vec![
                    "Icons must be valid PNG or JPG images.".to_string(),
                    format!("Icon: {}", target),
                ])
                .file(target.to_string()),
        );
        return;
    };

    let (width, height) = icon.dimensions();
    if width != height {
        err.error(
            Diagnostic::new(["resources", "icon", "square"], "Icon is not square")
                .description(vec![
                    "Icons must be square.".to_string(),
                    format!("Icon: {} ({}x{})", target, width, height),
                ])
                .file(target.to_string()),
        );
        return;
    }
    if size.parse::<u32>().ok() != Some(width) {
        err.error(
            Diagnostic::new(["resources", "icon", "size"], "Icon size does not match")
                .description(vec![
                    "The size of an icon must match the key it is listed under.".to_string(),
                    format!("Icon: {} is {}x{} but is listed as {}", target, width, height, size),
                ])
                .file(target.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Write};
    use std::time::Instant;
    use zip::write::FileOptions;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::new();
        DynamicImage::new_rgba8(width, height)
            .write_to(&mut Cursor::new(&mut data), image::ImageOutputFormat::Png)
            .unwrap();
        data
    }

    fn run_with(files: &[(&str, Vec<u8>)], manifest: Value) -> ErrorBundle {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        let package = Package::from_bytes("app.zip", writer.finish().unwrap().into_inner()).unwrap();
        let config = ValidatorConfig { fetch_resources: true, ..ValidatorConfig::default() };
        let mut err = ErrorBundle::new(true);
        let mut run = PackageRun::new(&config, package, Instant::now());
        run.manifest = Some(manifest);
        test_resources(&mut err, &mut run).unwrap();
        err
    }

    #[test]
    fn test_resolve() {
        let base = Url::parse("https://example.com/app/manifest.webapp").unwrap();
        assert_eq!(resolve("/icon.png", None), Some(Target::Local("icon.png".to_string())));
        assert_eq!(
            resolve("img/icon.png", Some(&base)),
            Some(Target::Remote(Url::parse("https://example.com/app/img/icon.png").unwrap()))
        );
        assert_eq!(resolve("data:image/png;base64,AAAA", None), None);
        assert_eq!(resolve("ftp://example.com/a.png", None), None);
    }

    #[test]
    fn test_valid_icons() {
        let err = run_with(
            &[("img/128.png", png(128, 128)), ("index.html", b"<p>".to_vec())],
            json!({"icons": {"128": "/img/128.png"}, "launch_path": "/index.html"}),
        );
        assert_eq!(err.messages().count(), 0);
    }

    #[test]
    fn test_gzipped_icon() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&png(64, 64)).unwrap();
        let err = run_with(&[("64.png", encoder.finish().unwrap())], json!({"icons": {"64": "64.png"}}));
        assert_eq!(err.messages().count(), 0);
    }

    #[test]
    fn test_icon_problems() {
        let err = run_with(
            &[("wide.png", png(64, 32)), ("small.png", png(32, 32)), ("bad.png", b"not an image".to_vec())],
            json!({"icons": {"64": "wide.png", "128": "small.png", "32": "bad.png"}}),
        );
        assert!(err.has_message(&["resources", "icon", "square"]));
        assert!(err.has_message(&["resources", "icon", "size"]));
        assert!(err.has_message(&["resources", "icon", "corrupt"]));
    }

    #[test]
    fn test_missing_local_resource() {
        let err = run_with(&[], json!({"launch_path": "/index.html"}));
        assert_eq!(err.errors().len(), 1);
        assert!(err.has_message(&["resources", "fetch", "failed"]));
    }
}
