//! The web app manifest schema and its custom checks.

use appvalidator_report::{Diagnostic, ErrorBundle, MessageKind};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde_json::{Map, Value};
use url::{ParseError, Url};

use crate::permissions::{access_levels, ALL_PERMISSIONS};
use crate::walker::{Kind, SchemaNode, Walker, ARRAY, BOOL, DESCRIPTION, LITERAL, NUMBER, OBJECT, STRING};

pub const SPEC_NAME: &str = "Web App Manifest";
pub const MORE_INFO: &str = "You can find more information at https://developer.mozilla.org/docs/Apps/Manifest";

pub const DEFAULT_MARKET_URLS: &[&str] = &["https://marketplace.firefox.com", "https://marketplace-dev.allizom.org"];

pub const MIN_REQUIRED_ICON_SIZE: u64 = 128;
/// Sizes Firefox OS devices render icons at
const RECOMMENDED_ICON_SIZES: &[&str] = &["60", "90", "120"];
/// Names longer than this are cut off on the home screen
pub const MAX_NAME_LENGTH: usize = 12;

const ORIENTATIONS: &[&str] = &[
    "portrait",
    "landscape",
    "portrait-secondary",
    "landscape-secondary",
    "portrait-primary",
    "landscape-primary",
];

/// Hosts reserved for the platform itself
const BANNED_ORIGINS: &[&str] = &["gaiamobile.org", "mozilla.com", "mozilla.org"];

/// Top-level nodes that may be repeated inside `locales.*`
const LOCALE_NODES: &[&str] = &[
    "name",
    "description",
    "launch_path",
    "icons",
    "developer",
    "version",
    "screen_size",
    "orientation",
    "fullscreen",
    "appcache_path",
];

const FILTER_VALUE: &[Kind] = &[Kind::String, Kind::Number, Kind::Bool, Kind::Array];

lazy_static! {
    static ref ORIGIN: Regex = Regex::new(r"^app://[a-z0-9]+([-.][a-z0-9]+)*\.[a-z]{2,5}$").unwrap();

    static ref BASE_SCHEMA: SchemaNode = SchemaNode::of(OBJECT)
        .required(&["name", "description", "developer"])
        .required_when("default_locale", |map| map.contains_key("locales"))
        .once(&[
            "launch_path", "icons", "locales", "default_locale", "installs_allowed_from", "version",
            "screen_size", "required_features", "orientation", "fullscreen", "appcache_path", "type",
            "activities", "permissions", "csp", "messages", "origin", "redirects", "chrome", "inputs",
            "role",
        ])
        .disallowed(&["widget"])
        .child("name", SchemaNode::of(STRING).max_length(128).not_empty())
        .child("description", SchemaNode::of(STRING).max_length(1024).not_empty())
        .child("launch_path", SchemaNode::of(STRING).not_empty().process(process_launch_path))
        .child("icons", SchemaNode::of(OBJECT).child_process(process_icon_size).process(process_icons))
        .child(
            "developer",
            SchemaNode::of(OBJECT)
                .required(&["name"])
                .once(&["url", "email"])
                .child("name", SchemaNode::of(STRING).not_empty())
                .child("url", SchemaNode::of(STRING).not_empty().process(process_dev_url)),
        )
        .child(
            "locales",
            SchemaNode::of(OBJECT).allowed(&["*"]).child("*", SchemaNode::of(OBJECT)),
        )
        .child("default_locale", SchemaNode::of(STRING).not_empty())
        .child("installs_allowed_from", SchemaNode::of(ARRAY).not_empty().process(process_iaf))
        .child(
            "version",
            SchemaNode::of(STRING)
                .not_empty()
                .matches(Regex::new(r"^[a-zA-Z0-9_,*\-.]+$").unwrap()),
        )
        .child(
            "screen_size",
            SchemaNode::of(OBJECT)
                .once(&["min_height", "min_width"])
                .not_empty()
                .child("min_height", SchemaNode::of(LITERAL).process(process_screen_size))
                .child("min_width", SchemaNode::of(LITERAL).process(process_screen_size)),
        )
        .child("required_features", SchemaNode::of(ARRAY))
        .child("orientation", SchemaNode::of(DESCRIPTION).process(process_orientation))
        .child("fullscreen", SchemaNode::of(STRING).values(&["true", "false"]))
        .child("appcache_path", SchemaNode::of(STRING).process(process_appcache_path))
        .child("type", SchemaNode::of(STRING).process(process_type))
        .child(
            "activities",
            SchemaNode::of(OBJECT).allowed(&["*"]).child(
                "*",
                SchemaNode::of(OBJECT)
                    .required(&["href"])
                    .once(&["disposition", "filters"])
                    .child("href", SchemaNode::of(STRING).not_empty().process(process_act_href))
                    .child("disposition", SchemaNode::of(STRING).values(&["window", "inline"]))
                    .child(
                        "filters",
                        SchemaNode::of(OBJECT)
                            .not_empty()
                            .allowed(&["*"])
                            .child("*", SchemaNode::default().not_empty().process(process_act_filter)),
                    )
                    .child("returnValue", SchemaNode::of(BOOL)),
            ),
        )
        .child(
            "permissions",
            SchemaNode::of(OBJECT)
                .allowed(&ALL_PERMISSIONS.iter().copied().collect::<Vec<_>>())
                .unknown_level(MessageKind::Error)
                .child(
                    "*",
                    SchemaNode::of(OBJECT)
                        .required(&["description"])
                        .once(&["access"])
                        .child("description", SchemaNode::of(STRING).not_empty())
                        .child("access", SchemaNode::of(STRING).not_empty()),
                )
                .process(process_permissions),
        )
        .child("csp", SchemaNode::of(STRING).not_empty())
        .child("messages", SchemaNode::of(ARRAY).process(process_messages))
        .child("origin", SchemaNode::of(STRING).process(process_origin))
        .child(
            "redirects",
            SchemaNode::of(ARRAY).each(
                SchemaNode::of(OBJECT)
                    .required(&["to", "from"])
                    .child("to", SchemaNode::of(STRING))
                    .child("from", SchemaNode::of(STRING)),
            ),
        )
        .child(
            "chrome",
            SchemaNode::of(OBJECT)
                .once(&["navigation"])
                .unknown_level(MessageKind::Error)
                .child("navigation", SchemaNode::of(BOOL)),
        )
        .child(
            "inputs",
            SchemaNode::of(OBJECT).not_empty().allowed(&["*"]).child("*", input_schema()),
        )
        .child("role", SchemaNode::of(STRING).values(&["system", "input", "homescreen"]));

    /// Structure of an object-valued activity filter
    static ref FILTER_DEFINITION: SchemaNode = SchemaNode::of(OBJECT)
        .once(&["required", "value", "min", "max", "pattern", "patternFlags", "regexp"])
        .child("required", SchemaNode::of(BOOL))
        .child("value", SchemaNode::of(FILTER_VALUE))
        .child("min", SchemaNode::of(NUMBER))
        .child("max", SchemaNode::of(NUMBER))
        .child("pattern", SchemaNode::of(STRING))
        .child("regexp", SchemaNode::of(STRING))
        .child(
            "patternFlags",
            SchemaNode::of(STRING).max_length(4).matches(Regex::new(r"^[igmy]+$").unwrap()),
        );
}

fn input_schema() -> SchemaNode {
    let localized = SchemaNode::of(OBJECT)
        .once(&["name", "description"])
        .child("name", SchemaNode::of(STRING).max_length(128).not_empty())
        .child("description", SchemaNode::of(STRING).not_empty());
    SchemaNode::of(OBJECT)
        .required(&["launch_path", "name", "description", "types"])
        .once(&["locales"])
        .child("launch_path", SchemaNode::of(STRING).not_empty().process(process_launch_path))
        .child("name", SchemaNode::of(STRING).max_length(128).not_empty())
        .child("description", SchemaNode::of(STRING).not_empty())
        .child(
            "types",
            SchemaNode::of(ARRAY)
                .not_empty()
                .each(SchemaNode::of(STRING).values(&["text", "url", "email", "password", "number", "option"])),
        )
        .child("locales", SchemaNode::of(OBJECT).allowed(&["*"]).child("*", localized))
}

/// What a URL-ish manifest value is allowed to be.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathRules {
    pub asterisk: bool,
    pub absolute: bool,
    pub relative: bool,
    pub data: bool,
    pub protocol: bool,
}

/// Classifies `path` and reports whether `rules` permit it. Only `http`
/// and `https` count as a permitted protocol.
pub fn path_valid(path: &str, rules: PathRules) -> bool {
    if path == "*" {
        return rules.asterisk;
    }
    if path.starts_with("data:") {
        return rules.data;
    }
    if path.starts_with("//") {
        return false;
    }
    match Url::parse(path) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.has_host() && rules.protocol,
        Err(ParseError::RelativeUrlWithoutBase) => {
            if path.starts_with('/') {
                rules.absolute
            } else {
                rules.relative
            }
        }
        Err(_) => false,
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn market_urls(err: &ErrorBundle) -> Vec<String> {
    match err.get_resource("market_urls").and_then(Value::as_array) {
        Some(urls) => urls.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        None => DEFAULT_MARKET_URLS.iter().map(|url| url.to_string()).collect(),
    }
}

fn process_launch_path(w: &mut Walker<'_>, value: &Value) {
    let Some(path) = value.as_str() else { return };
    if !path.starts_with('/') || path.starts_with("//") {
        w.error(
            &["spec", "webapp", "launch_path_rel"],
            "`launch_path` must be a path relative to app's origin.",
            vec![
                "The `launch_path` of a web app must be a path relative to the origin of the app.".to_string(),
                format!("Found: {}", path),
            ],
        );
    }
}

fn process_icon_size(w: &mut Walker<'_>, size: &str, value: &Value) {
    if !is_digits(size) {
        w.error(
            &["spec", "webapp", "icon_not_num"],
            "`icons` size is not a number.",
            vec!["Icon sizes (keys) must be natural numbers.".to_string(), format!("Found: {}", size)],
        );
    }

    let rules = PathRules { absolute: true, relative: true, data: true, protocol: true, ..PathRules::default() };
    if !value.as_str().map_or(false, |path| path_valid(path, rules)) {
        w.error(
            &["spec", "webapp", "icon_path"],
            "`icons` paths must be absolute paths.",
            vec![
                "Paths to icons must be absolute paths, relative URIs, or data URIs.".to_string(),
                format!("Found: {}", display(value)),
            ],
        );
    }
}

fn process_icons(w: &mut Walker<'_>, value: &Value) {
    let Some(icons) = value.as_object() else { return };
    if icons.is_empty() {
        return;
    }

    if w.err.resource_flag("listed") {
        let largest = icons.keys().filter(|k| is_digits(k)).filter_map(|k| k.parse::<u64>().ok()).max();
        if largest.unwrap_or(0) < MIN_REQUIRED_ICON_SIZE {
            w.error(
                &["spec", "webapp", "icon_minsize"],
                format!(
                    "An icon of at least {}x{} pixels must be provided.",
                    MIN_REQUIRED_ICON_SIZE, MIN_REQUIRED_ICON_SIZE
                ),
                "An icon with a minimum size of 128x128 must be provided by each app.",
            );
        }
    }

    for size in RECOMMENDED_ICON_SIZES.iter().copied() {
        if !icons.contains_key(size) {
            w.warning(
                &["spec", "webapp", "icon_recommended", size],
                format!("An icon of {}x{} pixels is recommended.", size, size),
                format!(
                    "Firefox OS devices display app icons at {}x{} pixels. Without one, a different size will be scaled to fit.",
                    size, size
                ),
            );
        }
    }

    if !icons.contains_key("32") && !icons.contains_key("256") {
        w.notice(
            &["spec", "webapp", "icon_os_sizes"],
            "Desktop icon sizes are missing.",
            "Desktop platforms use 32x32 and 256x256 pixel icons. Consider providing at least one of them.",
        );
    }
}

fn process_dev_url(w: &mut Walker<'_>, value: &Value) {
    let Some(url) = value.as_str() else { return };
    if !path_valid(url, PathRules { protocol: true, ..PathRules::default() }) {
        w.error(
            &["spec", "webapp", "dev_url"],
            "Developer URLs must be full or absolute URLs.",
            vec![
                "`url`s provided for the `developer` element must be full URLs (including the protocol).".to_string(),
                format!("Found: {}", url),
            ],
        );
    }
}

fn process_iaf(w: &mut Walker<'_>, value: &Value) {
    let Some(items) = value.as_array() else { return };
    let markets = market_urls(w.err);
    let mut found_market = false;

    for (index, item) in items.iter().enumerate() {
        let name = format!("`installs_allowed_from[{}]`", index);
        let Some(url) = item.as_str() else {
            w.error(
                &["spec", "webapp", "iaf_type"],
                format!("{} must be a string.", name),
                format!("{} was found in `installs_allowed_from`, but it is not a string type.", name),
            );
            continue;
        };

        if !path_valid(url, PathRules { asterisk: true, protocol: true, ..PathRules::default() }) {
            w.error(
                &["spec", "webapp", "iaf_invalid"],
                "Bad `installs_allowed_from` URL.",
                vec![
                    format!(
                        "URLs included in `installs_allowed_from` must be valid, absolute URLs. {} does not conform to this requirement.",
                        name
                    ),
                    format!("Found: {}", url),
                ],
            );
        } else if let Some(rest) = url.strip_prefix("http://").filter(|rest| markets.contains(&format!("https://{}", rest))) {
            debug!("insecure marketplace url for {}", rest);
            w.error(
                &["spec", "webapp", "iaf_bad_mrkt_protocol"],
                "Marketplace URL must use HTTPS.",
                vec![
                    "You included a Marketplace URL in the `installs_allowed_from` list, however the URL that you are using is not a secure URL. Change the protocol from `http://` to `https://` to correct this issue.".to_string(),
                    format!("Found: {}", url),
                ],
            );
        } else if url == "*" || markets.iter().any(|market| market == url) {
            found_market = true;
        }
    }

    if w.err.resource_flag("listed") && !found_market {
        let first = markets.first().cloned().unwrap_or_default();
        w.error(
            &["spec", "webapp", "iaf_no_amo"],
            "App must allow installs from Marketplace for inclusion.",
            format!(
                "To be included on {}, a webapp needs to include {} or '*' (wildcard) as an element in the `installs_allowed_from` property.",
                first,
                markets.join(", ")
            ),
        );
    }
}

fn process_messages(w: &mut Walker<'_>, value: &Value) {
    let Some(messages) = value.as_array() else { return };
    for message in messages {
        match message.as_object() {
            None => w.error(
                &["spec", "webapp", "messages_not_obj"],
                "Manifest messages must be objects.",
                "An item in the `messages` field of the manifest is not a key/value pair. See the manifest spec for more information.",
            ),
            Some(map) if map.len() != 1 => w.error(
                &["spec", "webapp", "messages_not_kv"],
                "Manifest message objects may only have one key.",
                "Perhaps unintuitively, the `messages` field of the manifest is a list of objects. Each object may only have one key/value pair.",
            ),
            Some(_) => {}
        }
    }
}

fn process_screen_size(w: &mut Walker<'_>, value: &Value) {
    let valid = match value {
        Value::String(s) => is_digits(s),
        Value::Number(n) => n.is_u64(),
        _ => false,
    };
    if !valid {
        w.error(
            &["spec", "webapp", "screensize_format"],
            "`screen_size` values must be numeric.",
            vec![
                "The values for `min_height` and `min_width` must be strings containing only numbers.".to_string(),
                format!("Found: {}", display(value)),
            ],
        );
    }
}

fn process_appcache_path(w: &mut Walker<'_>, value: &Value) {
    if w.err.resource_flag("packaged") {
        w.error(
            &["spec", "webapp", "appcache_packaged"],
            "`appcache_path` is not allowed for packaged apps.",
            "Packaged apps cannot use Appcache. The `appcache_path` field should not be provided in a packaged app's manifest.",
        );
        return;
    }

    let Some(path) = value.as_str() else { return };
    if !path_valid(path, PathRules { absolute: true, ..PathRules::default() }) {
        w.error(
            &["spec", "webapp", "appcache_not_absolute"],
            "`appcache_path` is not an absolute path.",
            vec![
                "The `appcache_path` must be a full, absolute URL to the application cache manifest.".to_string(),
                format!("Found: {}", path),
            ],
        );
    }
}

fn process_type(w: &mut Walker<'_>, value: &Value) {
    let Some(app_type) = value.as_str() else { return };
    if !matches!(app_type, "web" | "privileged" | "certified") {
        w.error(
            &["spec", "webapp", "type_not_known"],
            "`type` is not a recognized value",
            vec![
                "The `type` key does not contain a recognized value. `type` may only contain 'web', 'privileged', or 'certified'.".to_string(),
                format!("Found value: '{}'", app_type),
            ],
        );
    }

    if w.err.resource_flag("listed") && app_type == "certified" {
        w.error(
            &["spec", "webapp", "type_denied"],
            "Certified apps cannot be listed on the Marketplace.",
            "Apps marked as `certified` cannot be listed on the Firefox Marketplace.",
        );
    }

    if !w.err.resource_flag("packaged") && app_type != "web" {
        w.error(
            &["spec", "webapp", "type_denied_web"],
            "Web apps may not be privileged.",
            vec![
                "Web apps may not have a `type` of `privileged` or `certified`.".to_string(),
                format!("Detected type: {}", app_type),
            ],
        );
    }
}

fn process_act_href(w: &mut Walker<'_>, value: &Value) {
    let Some(href) = value.as_str() else { return };
    if !path_valid(href, PathRules { absolute: true, relative: true, ..PathRules::default() }) {
        w.error(
            &["spec", "webapp", "act_href_path"],
            "Activity `href` is not a valid path.",
            vec![
                "The `href` value for an activity must be an absolute or relative path within the app.".to_string(),
                format!("Found: {}", href),
            ],
        );
    }
}

fn is_basic_filter(value: &Value) -> bool {
    value.is_string() || value.is_number()
}

fn process_act_filter(w: &mut Walker<'_>, value: &Value) {
    let valid = match value {
        Value::Object(_) => {
            w.check_in_place(value, &FILTER_DEFINITION);
            true
        }
        Value::Array(items) => items.iter().all(is_basic_filter),
        other => is_basic_filter(other),
    };
    if !valid {
        w.error(
            &["spec", "webapp", "act_type"],
            "Activity filter is not valid.",
            vec![
                "Activity filter values must be a string, a number, an array of those, or a filter definition object.".to_string(),
                format!("Found: {}", value),
            ],
        );
    }
}

fn process_orientation(w: &mut Walker<'_>, value: &Value) {
    let message = "The value provided for a webapp's orientation should be either a string or an array of strings.";
    let recognized = format!("Recognized values: {}", ORIENTATIONS.join(", "));
    match value {
        Value::String(s) => {
            if !ORIENTATIONS.contains(&s.as_str()) {
                w.error(
                    &["spec", "webapp", "orientation", "str"],
                    "Webapp `orientation` is not a valid value.",
                    vec![message.to_string(), "The value provided was not a recognized value.".to_string(), recognized],
                );
            }
        }
        Value::Array(items) => {
            if items.is_empty() {
                w.error(
                    &["spec", "webapp", "orientation", "listempty"],
                    "Webapp `orientation` must contain at least one valid orientation.",
                    vec![
                        "If `orientation` is defined as an array, it must contain at least one valid value.".to_string(),
                        recognized.clone(),
                    ],
                );
            }
            for item in items {
                match item.as_str() {
                    None => w.error(
                        &["spec", "webapp", "orientation", "listtype"],
                        "Webapp `orientation` array does not contain string values.",
                        vec![
                            message.to_string(),
                            "When `orientation` is provided as an array, all of its values must be strings.".to_string(),
                            format!("Found value: {}", item),
                        ],
                    ),
                    Some(s) if !ORIENTATIONS.contains(&s) => w.error(
                        &["spec", "webapp", "orientation", "listval"],
                        "Webapp `orientation` array contains invalid values.",
                        vec![message.to_string(), "The value provided was not a recognized value.".to_string(), recognized.clone()],
                    ),
                    Some(_) => {}
                }
            }
        }
        _ => w.error(
            &["spec", "webapp", "orientation", "type"],
            "Webapp `orientation` is not a valid type.",
            vec![message.to_string(), "The value provided was not a string or an array.".to_string()],
        ),
    }
}

fn process_permissions(w: &mut Walker<'_>, value: &Value) {
    let Some(permissions) = value.as_object() else { return };

    for (permission, entry) in permissions {
        let Some(levels) = access_levels(permission) else { continue };
        let Some(entry) = entry.as_object() else { continue };

        match entry.get("access") {
            None => w.error(
                &["spec", "webapp", "permission", "missing_access"],
                "Webapp permission missing `access` node.",
                vec![
                    format!(
                        "The permission '{}' requires that an `access` node be provided in addition to a `description` node.",
                        permission
                    ),
                    format!("Access values for this permission: {}", levels.join(", ")),
                ],
            ),
            Some(access) if !access.as_str().map_or(false, |a| levels.contains(&a)) => w.error(
                &["spec", "webapp", "permission", "bad_access"],
                "Webapp permission has an invalid `access` value.",
                vec![
                    format!("The permission '{}' was given an invalid `access` node value.", permission),
                    format!("Valid values: {}", levels.join(", ")),
                    format!("Found value: {}", display(access)),
                ],
            ),
            Some(_) => {}
        }
    }

    let requested: Vec<Value> = permissions.keys().cloned().map(Value::String).collect();
    w.err.save_resource("permissions", requested);
}

fn process_origin(w: &mut Walker<'_>, value: &Value) {
    let Some(origin) = value.as_str() else { return };

    let app_type = w.root().get("type").and_then(Value::as_str).unwrap_or("web");
    if !matches!(app_type, "privileged" | "certified") {
        w.error(
            &["spec", "webapp", "origin", "unprivileged"],
            "`origin` is only allowed for privileged apps.",
            vec![
                "Only privileged and certified apps may declare an `origin`.".to_string(),
                format!("Detected type: {}", app_type),
            ],
        );
    }

    if !ORIGIN.is_match(origin) {
        w.error(
            &["spec", "webapp", "origin", "format"],
            "`origin` is not a valid app origin.",
            vec![
                "App origins must have the form `app://domain.tld`, with no path and no trailing slash.".to_string(),
                format!("Found: {}", origin),
            ],
        );
        return;
    }

    let host = &origin["app://".len()..];
    for banned in BANNED_ORIGINS.iter().copied() {
        if host == banned || host.ends_with(&format!(".{}", banned)) {
            w.error(
                &["spec", "webapp", "origin", banned],
                "`origin` uses a reserved domain.",
                vec![
                    format!("Origins ending in `{}` are reserved for the platform.", banned),
                    format!("Found: {}", origin),
                ],
            );
        }
    }
}

/// The manifest schema, specialised for one kind of submission.
#[derive(Debug, Clone)]
pub struct WebappSpec {
    schema: SchemaNode,
}

impl WebappSpec {
    pub fn new(packaged: bool, listed: bool) -> Self {
        let mut schema = BASE_SCHEMA.clone();

        let mut localized = SchemaNode::of(OBJECT).once(LOCALE_NODES);
        for name in LOCALE_NODES {
            if let Some(node) = schema.named_child(name) {
                localized = localized.child(name, node.clone());
            }
        }
        // A localized developer block need not repeat the name.
        if let Some(developer) = localized.named_child_mut("developer") {
            developer.required_nodes.clear();
            developer.allowed_once_nodes.push("name".to_string());
        }
        if let Some(locales) = schema.named_child_mut("locales") {
            *locales = locales.clone().child("*", localized);
        }

        if packaged {
            schema.required_nodes.push("launch_path".to_string());
        }
        if listed {
            schema.required_nodes.push("icons".to_string());
            schema.allowed_once_nodes.retain(|name| name != "icons");
        }

        Self { schema }
    }

    /// Reads the `packaged` and `listed` flags from the bundle's resources.
    pub fn for_bundle(err: &ErrorBundle) -> Self {
        Self::new(err.resource_flag("packaged"), err.resource_flag("listed"))
    }

    pub fn schema(&self) -> &SchemaNode {
        &self.schema
    }

    /// Validates a decoded manifest, reporting into `err`.
    pub fn validate(&self, err: &mut ErrorBundle, manifest: &Value) {
        if !manifest.is_object() {
            err.error(
                Diagnostic::new(["spec", "webapp", "root_type"], "App manifest root is not an object.")
                    .description("The root of the manifest is expected to be an object. It may not be a list or a literal."),
            );
            return;
        }

        debug!("validating manifest against the {}", SPEC_NAME);
        let mut walker = Walker::new(err, manifest, MORE_INFO);
        walker.walk("root", manifest, &self.schema);
    }
}

/// Warns when the app name, or any localized name, is long enough to be
/// truncated on device home screens.
pub fn check_name_truncation(err: &mut ErrorBundle, manifest: &Value) {
    let Some(root) = manifest.as_object() else { return };
    warn_long_name(err, root, None);

    if let Some(locales) = root.get("locales").and_then(Value::as_object) {
        for (locale, entry) in locales {
            if let Some(entry) = entry.as_object() {
                warn_long_name(err, entry, Some(locale));
            }
        }
    }
}

fn warn_long_name(err: &mut ErrorBundle, node: &Map<String, Value>, locale: Option<&str>) {
    let Some(name) = node.get("name").and_then(Value::as_str) else { return };
    if name.chars().count() <= MAX_NAME_LENGTH {
        return;
    }

    let mut description = vec![
        "Your app's name is long enough to possibly be truncated on Firefox OS devices. Consider using a shorter name for your app.".to_string(),
        format!("App names may be truncated after {} characters.", MAX_NAME_LENGTH),
    ];
    if let Some(locale) = locale {
        description.push(format!("Seen in the \"{}\" locale.", locale));
    }
    err.warning(
        Diagnostic::new(["webapp", "b2g", "name_truncated"], "App name may be truncated on Firefox OS devices.")
            .description(description),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_rules() {
        let none = PathRules::default();
        assert!(!path_valid("*", none));
        assert!(path_valid("*", PathRules { asterisk: true, ..none }));
        assert!(!path_valid("/foo/bar", none));
        assert!(path_valid("/foo/bar", PathRules { absolute: true, ..none }));
        assert!(!path_valid("//foo/bar", PathRules { absolute: true, relative: true, ..none }));
        assert!(!path_valid("http://asdf/", none));
        assert!(path_valid("http://asdf/", PathRules { protocol: true, ..none }));
        assert!(path_valid("HTTPS://asdf/", PathRules { protocol: true, ..none }));
        assert!(!path_valid("ftp://asdf/", PathRules { protocol: true, ..none }));
        assert!(!path_valid("data:asdf", none));
        assert!(path_valid("data:asdf", PathRules { data: true, ..none }));
        assert!(path_valid("foo/bar", PathRules { relative: true, ..none }));
    }

    #[test]
    fn test_locale_schema_is_relaxed() {
        let spec = WebappSpec::new(false, false);
        let locale = spec
            .schema()
            .named_child("locales")
            .and_then(|locales| locales.named_child("*"))
            .and_then(|entry| entry.named_child("developer"))
            .map(|developer| developer.required_nodes.clone());
        assert_eq!(locale, Some(Vec::new()));

        let top = spec.schema().named_child("developer").map(|d| d.required_nodes.clone());
        assert_eq!(top, Some(vec!["name".to_string()]));
    }

    #[test]
    fn test_submission_flags_change_requirements() {
        let spec = WebappSpec::new(true, true);
        assert!(spec.schema().required_nodes.contains(&"launch_path".to_string()));
        assert!(spec.schema().required_nodes.contains(&"icons".to_string()));
        assert!(!spec.schema().allowed_once_nodes.contains(&"icons".to_string()));
    }
}
