use appvalidator_report::ErrorBundle;
use appvalidator_spec::{check_name_truncation, WebappSpec};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn manifest() -> Value {
    let mut description = "Exciting Open Web development action!".to_string();
    description.push_str(&"_".repeat(1024 - description.len()));
    json!({
        "version": "1.0",
        "name": "MozBall",
        "description": description,
        "icons": {
            "16": "/img/icon-16.png",
            "32": "/img/icon-32.png",
            "48": "/img/icon-48.png",
            "60": "/img/icon-60.png",
            "90": "/img/icon-90.png",
            "120": "/img/icon-120.png",
            "128": "/img/icon-128.png",
            "256": "/img/icon-256.png"
        },
        "developer": {"name": "Mozilla Labs", "url": "http://mozillalabs.com"},
        "installs_allowed_from": ["https://appstore.mozillalabs.com", "HTTP://mozilla.com/AppStore"],
        "launch_path": "/index.html",
        "locales": {
            "es": {
                "name": "Foo Bar",
                "description": "¡Acción abierta emocionante del desarrollo",
                "developer": {"url": "http://es.mozillalabs.com/"}
            },
            "it": {
                "description": "Azione aperta emozionante di sviluppo di!",
                "developer": {"url": "http://it.mozillalabs.com/"}
            }
        },
        "default_locale": "en",
        "screen_size": {"min_width": "600", "min_height": "300"},
        "required_features": ["touch", "geolocation", "webgl"],
        "orientation": "landscape",
        "fullscreen": "true",
        "type": "web"
    })
}

fn analyze_as(data: &Value, listed: bool, packaged: bool) -> ErrorBundle {
    let mut err = ErrorBundle::new(listed);
    if packaged {
        err.save_resource("packaged", true);
    }
    WebappSpec::for_bundle(&err).validate(&mut err, data);
    check_name_truncation(&mut err, data);
    err
}

fn analyze(data: &Value) -> ErrorBundle {
    analyze_as(data, false, false)
}

fn set(data: &mut Value, key: &str, value: Value) {
    data[key] = value;
}

fn remove(data: &mut Value, key: &str) {
    if let Some(map) = data.as_object_mut() {
        map.remove(key);
    }
}

fn ids(err: &ErrorBundle) -> Vec<String> {
    err.messages().map(|m| m.id.join(".")).collect()
}

fn assert_silent(err: &ErrorBundle) {
    assert_eq!(ids(err), Vec::<String>::new());
}

#[test]
fn test_bland_manifest_is_silent() {
    assert_silent(&analyze(&manifest()));
}

#[test]
fn test_minimal_manifest_has_no_errors() {
    let data = json!({"name": "X", "description": "D", "developer": {"name": "Y"}});
    let err = analyze(&data);
    assert!(err.errors().is_empty());
    assert!(err.warnings().iter().all(|m| m.id.contains(&"icon_recommended".to_string())));
}

#[test]
fn test_root_must_be_object() {
    let err = analyze(&json!(["name"]));
    assert_eq!(ids(&err), vec!["spec.webapp.root_type"]);
}

#[test]
fn test_rerun_is_stable() {
    let mut data = manifest();
    set(&mut data, "foobar", json!("hello"));
    set(&mut data, "fullscreen", json!("fart"));
    assert_eq!(ids(&analyze(&data)), ids(&analyze(&data)));
}

#[test]
fn test_required_and_disallowed_nodes() {
    let mut data = manifest();
    remove(&mut data, "name");
    set(&mut data, "widget", json!({"path": "/w.html"}));
    let err = analyze(&data);
    assert!(err.has_message(&["spec", "iterate", "missing_req"]));
    assert!(err.has_message(&["spec", "iterate", "not_allowed"]));
}

#[test]
fn test_unknown_keys_warn() {
    let mut data = manifest();
    set(&mut data, "foobar", json!("hello"));
    assert_eq!(ids(&analyze(&data)), vec!["spec.iterate.unknown"]);

    let mut data = manifest();
    data["locales"]["es"]["default_locale"] = json!("foo");
    let err = analyze(&data);
    assert!(err.errors().is_empty());
    assert_eq!(err.warnings().len(), 1);
}

#[test]
fn test_locales_need_default_locale() {
    let mut data = manifest();
    remove(&mut data, "default_locale");
    assert!(analyze(&data).has_message(&["spec", "iterate", "missing_req_cond"]));

    remove(&mut data, "locales");
    assert_silent(&analyze(&data));
}

#[test]
fn test_length_and_format_limits() {
    let mut data = manifest();
    set(&mut data, "name", json!("%".repeat(129)));
    set(&mut data, "version", json!("Mountain Lion"));
    set(&mut data, "fullscreen", json!(""));
    let err = analyze(&data);
    assert!(err.has_message(&["spec", "iterate", "max_length"]));
    assert!(err.has_message(&["spec", "iterate", "value_pattern_fail"]));
    assert!(err.has_message(&["spec", "iterate", "bad_value"]));
}

#[test]
fn test_icon_rules() {
    let mut data = manifest();
    data["icons"]["foo"] = json!("/foo.png");
    data["icons"]["128"] = json!("ftp://example.com/icon.png");
    let err = analyze(&data);
    assert!(err.has_message(&["spec", "webapp", "icon_not_num"]));
    assert!(err.has_message(&["spec", "webapp", "icon_path"]));

    let mut data = manifest();
    data["icons"]["128"] = json!("data:foo/bar.png");
    assert_silent(&analyze(&data));

    let mut data = manifest();
    remove(&mut data["icons"], "60");
    assert_eq!(ids(&analyze(&data)), vec!["spec.webapp.icon_recommended.60"]);

    let mut data = manifest();
    let icons = data["icons"].as_object_mut().expect("icons");
    icons.remove("32");
    icons.remove("256");
    let err = analyze(&data);
    assert_eq!(err.notices().len(), 1);
}

#[test]
fn test_listed_apps_need_large_icons_and_marketplace() {
    let mut data = manifest();
    set(&mut data, "installs_allowed_from", json!(["https://marketplace.firefox.com"]));
    let icons = data["icons"].as_object_mut().expect("icons");
    icons.remove("128");
    icons.remove("256");
    let err = analyze_as(&data, true, false);
    assert_eq!(ids(&err), vec!["spec.webapp.icon_minsize"]);

    let err = analyze_as(&manifest(), true, false);
    assert_eq!(ids(&err), vec!["spec.webapp.iaf_no_amo"]);

    let mut data = manifest();
    set(&mut data, "installs_allowed_from", json!(["https://appstore.mozillalabs.com", "*"]));
    assert_silent(&analyze_as(&data, true, false));
}

#[test]
fn test_insecure_marketplace_url() {
    let mut data = manifest();
    set(&mut data, "installs_allowed_from", json!(["http://marketplace.firefox.com"]));
    let err = analyze_as(&data, true, false);
    assert!(err.has_message(&["spec", "webapp", "iaf_bad_mrkt_protocol"]));
    assert!(err.has_message(&["spec", "webapp", "iaf_no_amo"]));
}

#[test]
fn test_custom_market_urls() {
    let mut data = manifest();
    set(&mut data, "installs_allowed_from", json!(["https://store.example.com"]));
    let mut err = ErrorBundle::new(true);
    err.save_resource("market_urls", json!(["https://store.example.com"]));
    WebappSpec::for_bundle(&err).validate(&mut err, &data);
    assert_silent(&err);
}

#[test]
fn test_launch_path_rules() {
    let mut data = manifest();
    remove(&mut data, "launch_path");
    assert!(analyze_as(&data, false, true).has_message(&["spec", "iterate", "missing_req"]));

    for bad in ["data:asdf", "http://foo.com/bar", "index.html", "//foo/bar"] {
        let mut data = manifest();
        set(&mut data, "launch_path", json!(bad));
        assert_eq!(ids(&analyze(&data)), vec!["spec.webapp.launch_path_rel"], "{}", bad);
    }
}

#[test]
fn test_developer_url() {
    let mut data = manifest();
    data["developer"]["url"] = json!("/about");
    assert_eq!(ids(&analyze(&data)), vec!["spec.webapp.dev_url"]);
}

#[test]
fn test_type_rules() {
    let mut data = manifest();
    set(&mut data, "type", json!("foo"));
    assert!(analyze(&data).has_message(&["spec", "webapp", "type_not_known"]));

    set(&mut data, "type", json!("privileged"));
    assert_eq!(ids(&analyze(&data)), vec!["spec.webapp.type_denied_web"]);
    assert_silent(&analyze_as(&data, false, true));

    set(&mut data, "type", json!("certified"));
    let mut listed = data.clone();
    listed["installs_allowed_from"] = json!(["*"]);
    assert_eq!(ids(&analyze_as(&listed, true, true)), vec!["spec.webapp.type_denied"]);
}

#[test]
fn test_appcache_path() {
    let mut data = manifest();
    set(&mut data, "appcache_path", json!("/cache.manifest"));
    assert_silent(&analyze(&data));
    assert_eq!(ids(&analyze_as(&data, false, true)), vec!["spec.webapp.appcache_packaged"]);

    set(&mut data, "appcache_path", json!("cache.manifest"));
    assert_eq!(ids(&analyze(&data)), vec!["spec.webapp.appcache_not_absolute"]);
}

#[test]
fn test_screen_size_values() {
    let mut data = manifest();
    data["screen_size"]["min_width"] = json!("wide");
    assert_eq!(ids(&analyze(&data)), vec!["spec.webapp.screensize_format"]);
}

#[test]
fn test_orientation_values() {
    for (value, expected) in [
        (json!(["portrait", "landscape-primary"]), None),
        (json!("sideways"), Some("spec.webapp.orientation.str")),
        (json!([]), Some("spec.webapp.orientation.listempty")),
        (json!(["portrait", 4]), Some("spec.webapp.orientation.listtype")),
        (json!(["portrait", "upside"]), Some("spec.webapp.orientation.listval")),
    ] {
        let mut data = manifest();
        set(&mut data, "orientation", value);
        let found = ids(&analyze(&data));
        assert_eq!(found, expected.into_iter().map(str::to_string).collect::<Vec<_>>());
    }
}

#[test]
fn test_permissions() {
    let mut data = manifest();
    set(
        &mut data,
        "permissions",
        json!({
            "alarms": {"description": "Wake up"},
            "contacts": {"description": "Friends", "access": "readcreate"},
            "settings": {"description": "Tweak", "access": "createonly"},
            "device-storage:music": {"description": "Songs"},
        }),
    );
    let err = analyze(&data);
    assert_eq!(ids(&err), vec!["spec.webapp.permission.bad_access", "spec.webapp.permission.missing_access"]);
    assert_eq!(
        err.get_resource("permissions"),
        Some(&json!(["alarms", "contacts", "settings", "device-storage:music"]))
    );

    let mut data = manifest();
    set(&mut data, "permissions", json!({"foo": {"description": "lol"}, "alarms": {}}));
    let err = analyze(&data);
    assert!(err.has_message(&["spec", "iterate", "unknown"]));
    assert!(err.has_message(&["spec", "iterate", "missing_req"]));
    assert!(err.warnings().is_empty());
}

#[test]
fn test_messages_shape() {
    let mut data = manifest();
    set(&mut data, "messages", json!([{"key": "val"}, {"key": "val"}]));
    assert_silent(&analyze(&data));

    set(&mut data, "messages", json!(["key", {"a": 1, "b": 2}]));
    assert_eq!(ids(&analyze(&data)), vec!["spec.webapp.messages_not_obj", "spec.webapp.messages_not_kv"]);
}

#[test]
fn test_activities() {
    let mut data = manifest();
    set(
        &mut data,
        "activities",
        json!({
            "share": {
                "href": "share.html",
                "disposition": "inline",
                "returnValue": true,
                "filters": {
                    "type": ["image/png", "image/gif"],
                    "number": 3,
                    "url": {"required": true, "pattern": "https?:.{1,16384}", "patternFlags": "i"}
                }
            }
        }),
    );
    assert_silent(&analyze(&data));

    data["activities"]["share"]["filters"]["url"]["patternFlags"] = json!("igmyx");
    data["activities"]["share"]["filters"]["flag"] = json!(false);
    data["activities"]["share"]["href"] = json!("http://example.com/share");
    let err = analyze(&data);
    assert!(err.has_message(&["spec", "iterate", "max_length"]));
    assert!(err.has_message(&["spec", "iterate", "value_pattern_fail"]));
    assert!(err.has_message(&["spec", "webapp", "act_type"]));
    assert!(err.has_message(&["spec", "webapp", "act_href_path"]));
}

#[test]
fn test_origin_requires_privileges() {
    let mut data = manifest();
    set(&mut data, "origin", json!("app://domain.com"));
    assert_eq!(ids(&analyze(&data)), vec!["spec.webapp.origin.unprivileged"]);

    set(&mut data, "type", json!("privileged"));
    for origin in ["app://domain.com", "app://my-domain.com", "app://sub.domain.com", "app://marketplace.firefox.com"] {
        set(&mut data, "origin", json!(origin));
        assert_silent(&analyze_as(&data, false, true));
    }

    for origin in ["app://hello", "http://asdf", "app://domain.com/path", "app://domain.com/"] {
        set(&mut data, "origin", json!(origin));
        assert_eq!(ids(&analyze_as(&data, false, true)), vec!["spec.webapp.origin.format"], "{}", origin);
    }
}

#[test]
fn test_banned_origin() {
    let mut data = manifest();
    set(&mut data, "type", json!("privileged"));
    set(&mut data, "origin", json!("app://my.gaiamobile.org"));
    let err = analyze_as(&data, false, true);
    assert!(err.has_message(&["spec", "webapp", "origin", "gaiamobile.org"]));

    set(&mut data, "origin", json!("app://mozilla.org"));
    assert!(analyze_as(&data, false, true).has_message(&["spec", "webapp", "origin", "mozilla.org"]));
}

#[test]
fn test_redirects_and_chrome() {
    let mut data = manifest();
    set(&mut data, "redirects", json!([{"to": "asdf", "from": "qwer"}]));
    set(&mut data, "chrome", json!({"navigation": true}));
    assert_silent(&analyze(&data));

    set(&mut data, "redirects", json!(["asdf", {"to": "asdf"}]));
    set(&mut data, "chrome", json!({"haldo": 123}));
    let err = analyze(&data);
    assert!(err.has_message(&["spec", "iterate", "bad_type"]));
    assert!(err.has_message(&["spec", "iterate", "missing_req"]));
    assert!(err.has_message(&["spec", "iterate", "unknown"]));
    assert!(err.warnings().is_empty());
}

#[test]
fn test_inputs() {
    let mut data = manifest();
    set(
        &mut data,
        "inputs",
        json!({
            "input1": {
                "name": "Symbols",
                "description": "Symbols Virtual Keyboard",
                "launch_path": "/input1.html",
                "types": ["text"],
                "locales": {"es": {"name": "foo", "description": "bar"}}
            }
        }),
    );
    set(&mut data, "role", json!("input"));
    assert_silent(&analyze(&data));

    data["inputs"]["input1"]["types"] = json!(["foo"]);
    data["inputs"]["input1"]["locales"]["es"]["foo"] = json!("bar2");
    assert_eq!(ids(&analyze(&data)), vec!["spec.iterate.bad_value", "spec.iterate.unknown"]);

    let mut data = manifest();
    set(&mut data, "role", json!("hello"));
    assert_eq!(ids(&analyze(&data)), vec!["spec.iterate.bad_value"]);

    set(&mut data, "inputs", json!({}));
    assert!(analyze(&data).has_message(&["spec", "iterate", "empty"]));
}

#[test]
fn test_long_names_may_be_truncated() {
    let mut data = manifest();
    data["locales"]["es"]["name"] = json!("This is a long name.");
    let err = analyze(&data);
    assert_eq!(ids(&err), vec!["webapp.b2g.name_truncated"]);
    assert!(err.warnings()[0].description.flatten().contains("\"es\" locale"));
}
