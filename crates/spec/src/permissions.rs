//! Permission tables for the three app types.
//!
//! Each app type may request its own set plus every set below it:
//! `web` < `privileged` < `certified`.

use std::collections::BTreeSet;

use lazy_static::lazy_static;

pub const WEB_PERMISSIONS: &[&str] = &[
    "alarms",
    "audio-capture",
    "audio-channel-content",
    "audio-channel-normal",
    "desktop-notification",
    "fmradio",
    "geolocation",
    "push",
    "storage",
    "video-capture",
];

pub const PRIVILEGED_PERMISSIONS: &[&str] = &[
    "audio-channel-alarm",
    "audio-channel-notification",
    "browser",
    "contacts",
    "device-storage:apps",
    "device-storage:music",
    "device-storage:pictures",
    "device-storage:sdcard",
    "device-storage:videos",
    "input",
    "mobileid",
    "speaker-control",
    "systemXHR",
    "tcp-socket",
];

pub const CERTIFIED_PERMISSIONS: &[&str] = &[
    "attention",
    "audio-channel-publicnotification",
    "audio-channel-ringer",
    "audio-channel-telephony",
    "background-sensors",
    "backgroundservice",
    "bluetooth",
    "camera",
    "cellbroadcast",
    "embed-apps",
    "idle",
    "mobileconnection",
    "mobilenetwork",
    "network-events",
    "networkstats-manage",
    "open-remote-window",
    "permissions",
    "power",
    "settings",
    "sms",
    "telephony",
    "time",
    "voicemail",
    "webapps-manage",
    "wifi-manage",
];

const FULL_ACCESS: &[&str] = &["readonly", "readwrite", "readcreate", "createonly"];

lazy_static! {
    /// Every permission a manifest may name, regardless of app type.
    pub static ref ALL_PERMISSIONS: BTreeSet<&'static str> = WEB_PERMISSIONS
        .iter()
        .chain(PRIVILEGED_PERMISSIONS)
        .chain(CERTIFIED_PERMISSIONS)
        .copied()
        .collect();
}

/// Permissions an app of `app_type` may request. Unknown types get the
/// `web` set.
pub fn allowed_for(app_type: &str) -> BTreeSet<&'static str> {
    let mut allowed: BTreeSet<&'static str> = WEB_PERMISSIONS.iter().copied().collect();
    if app_type == "privileged" || app_type == "certified" {
        allowed.extend(PRIVILEGED_PERMISSIONS);
    }
    if app_type == "certified" {
        allowed.extend(CERTIFIED_PERMISSIONS);
    }
    allowed
}

/// Values accepted in the `access` field, for permissions that require one.
pub fn access_levels(permission: &str) -> Option<&'static [&'static str]> {
    match permission {
        "contacts"
        | "device-storage:apps"
        | "device-storage:music"
        | "device-storage:pictures"
        | "device-storage:sdcard"
        | "device-storage:videos" => Some(FULL_ACCESS),
        "settings" => Some(&["readonly", "readwrite"]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sets_are_disjoint() {
        assert_eq!(
            ALL_PERMISSIONS.len(),
            WEB_PERMISSIONS.len() + PRIVILEGED_PERMISSIONS.len() + CERTIFIED_PERMISSIONS.len()
        );
    }

    #[test]
    fn test_allowed_for_nests() {
        assert!(allowed_for("web").contains("fmradio"));
        assert!(!allowed_for("web").contains("tcp-socket"));
        assert!(allowed_for("privileged").contains("tcp-socket"));
        assert!(!allowed_for("privileged").contains("cellbroadcast"));
        assert!(allowed_for("certified").contains("cellbroadcast"));
        assert!(allowed_for("certified").contains("fmradio"));
        assert_eq!(allowed_for("bogus"), allowed_for("web"));
    }

    #[test]
    fn test_access_levels() {
        assert_eq!(access_levels("settings"), Some(&["readonly", "readwrite"][..]));
        assert_eq!(access_levels("contacts").map(|a| a.len()), Some(4));
        assert_eq!(access_levels("alarms"), None);
    }
}
