//! Platform features an app was seen using.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::message::FileRef;

/// One place a feature was touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureUsage {
    pub file: FileRef,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

/// Append-only record of feature tags and every site that used them.
#[derive(Debug, Clone, Default)]
pub struct FeatureProfile {
    usage: BTreeMap<String, Vec<FeatureUsage>>,
}

impl FeatureProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_feature(&mut self, tag: &str, usage: FeatureUsage) {
        log::debug!("Feature {} used in {} at {:?}", tag, usage.file, usage.line);
        self.usage.entry(tag.to_string()).or_default().push(usage);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.usage.contains_key(tag)
    }

    /// Tags in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.usage.keys().map(String::as_str)
    }

    pub fn usages(&self, tag: &str) -> &[FeatureUsage] {
        self.usage.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.usage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.usage.is_empty()
    }

    pub(crate) fn to_json(&self) -> (serde_json::Value, serde_json::Value) {
        let tags = serde_json::Value::from(self.tags().collect::<Vec<_>>());
        let usage = serde_json::to_value(&self.usage).unwrap_or(serde_json::Value::Null);
        (tags, usage)
    }
}
