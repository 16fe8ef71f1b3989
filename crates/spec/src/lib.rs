//! Declarative manifest validation
//!
//! [`walker`] holds the generic schema machinery; [`webapp`] instantiates
//! it for web app manifests, and [`permissions`] lists which permissions
//! each app type may request.

pub mod permissions;
pub mod walker;
pub mod webapp;

pub use permissions::{access_levels, allowed_for, ALL_PERMISSIONS};
pub use walker::{Children, Kind, SchemaNode, Walker};
pub use webapp::{check_name_truncation, path_valid, PathRules, WebappSpec, DEFAULT_MARKET_URLS, MORE_INFO};
