//! The message sink shared by every test in a validation run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use crate::error::{ReportError, ReportResult};
use crate::features::{FeatureProfile, FeatureUsage};
use crate::message::{ContextSource, Diagnostic, FileRef, Message, MessageKind};
use crate::output::OutputHandler;

type DedupKey = (Vec<String>, FileRef, Option<usize>, Option<usize>);

/// Collects messages, resources and metadata for one validation run.
#[derive(Debug)]
pub struct ErrorBundle {
    errors: Vec<Message>,
    warnings: Vec<Message>,
    notices: Vec<Message>,
    seen: HashSet<DedupKey>,

    tier: u8,
    ending_tier: u8,
    /// Keep running later tiers after a tier fails.
    pub determined: bool,
    /// Set when a run stopped before every tier had a chance to run.
    pub unfinished: bool,

    resources: HashMap<String, Value>,
    pushable_resources: HashMap<String, Value>,
    metadata: Map<String, Value>,
    feature_profile: FeatureProfile,
}

impl Default for ErrorBundle {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ErrorBundle {
    pub fn new(listed: bool) -> Self {
        let mut bundle = Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            notices: Vec::new(),
            seen: HashSet::new(),
            tier: 1,
            ending_tier: 1,
            determined: true,
            unfinished: false,
            resources: HashMap::new(),
            pushable_resources: HashMap::new(),
            metadata: Map::new(),
            feature_profile: FeatureProfile::new(),
        };
        bundle.save_resource("listed", listed);
        bundle
    }

    pub fn error(&mut self, diagnostic: Diagnostic<'_>) -> bool {
        self.save_message(MessageKind::Error, diagnostic)
    }

    pub fn warning(&mut self, diagnostic: Diagnostic<'_>) -> bool {
        self.save_message(MessageKind::Warning, diagnostic)
    }

    pub fn notice(&mut self, diagnostic: Diagnostic<'_>) -> bool {
        self.save_message(MessageKind::Notice, diagnostic)
    }

    /// Raises a message at the given severity.
    pub fn report(&mut self, kind: MessageKind, diagnostic: Diagnostic<'_>) -> bool {
        self.save_message(kind, diagnostic)
    }

    /// Stores a message unless one with the same id and location exists.
    /// Returns whether the message was kept.
    fn save_message(&mut self, kind: MessageKind, diagnostic: Diagnostic<'_>) -> bool {
        let key = (
            diagnostic.id.clone(),
            diagnostic.file.clone(),
            diagnostic.line,
            diagnostic.column,
        );
        if !self.seen.insert(key) {
            log::trace!("Dropping duplicate {} {:?}", kind, diagnostic.id);
            return false;
        }

        let context = match diagnostic.context {
            Some(ContextSource::Window(window)) => Some(window),
            Some(ContextSource::Generator(generator)) => {
                generator.get_context(diagnostic.line.unwrap_or(1), diagnostic.column)
            }
            None => None,
        };

        let message = Message {
            uid: uuid::Uuid::new_v4().simple().to_string(),
            kind,
            id: diagnostic.id,
            message: diagnostic.message,
            description: diagnostic.description,
            file: diagnostic.file,
            line: diagnostic.line,
            column: diagnostic.column,
            tier: diagnostic.tier.unwrap_or(self.tier),
            context,
        };
        log::debug!("{} {:?}: {}", kind, message.id, message.message.flatten());

        match kind {
            MessageKind::Error => self.errors.push(message),
            MessageKind::Warning => self.warnings.push(message),
            MessageKind::Notice => self.notices.push(message),
        }
        true
    }

    /// Sets the current tier and bumps the high-water mark.
    pub fn set_tier(&mut self, tier: u8) {
        self.tier = tier;
        if tier > self.ending_tier {
            self.ending_tier = tier;
        }
    }

    pub fn tier(&self) -> u8 {
        self.tier
    }

    pub fn ending_tier(&self) -> u8 {
        self.ending_tier
    }

    pub fn failed(&self, fail_on_warnings: bool) -> bool {
        !self.errors.is_empty() || (fail_on_warnings && !self.warnings.is_empty())
    }

    pub fn errors(&self) -> &[Message] {
        &self.errors
    }

    pub fn warnings(&self) -> &[Message] {
        &self.warnings
    }

    pub fn notices(&self) -> &[Message] {
        &self.notices
    }

    /// All messages: errors, then warnings, then notices.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.errors.iter().chain(self.warnings.iter()).chain(self.notices.iter())
    }

    /// Whether any message carries exactly this id.
    pub fn has_message(&self, id: &[&str]) -> bool {
        self.messages().any(|m| m.id.iter().map(String::as_str).eq(id.iter().copied()))
    }

    /// Drops every message raised at a tier above `ending_tier`.
    pub fn discard_unused_messages(&mut self, ending_tier: u8) {
        for stack in [&mut self.errors, &mut self.warnings, &mut self.notices] {
            stack.retain(|m| m.tier <= ending_tier);
        }
    }

    // Resources

    /// Looks a resource up, checking plain resources before pushable ones.
    pub fn get_resource(&self, name: &str) -> Option<&Value> {
        self.resources.get(name).or_else(|| self.pushable_resources.get(name))
    }

    /// A resource read as a flag. Missing resources are false.
    pub fn resource_flag(&self, name: &str) -> bool {
        match self.get_resource(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }

    pub fn resource_str(&self, name: &str) -> Option<&str> {
        self.get_resource(name).and_then(Value::as_str)
    }

    pub fn has_resource(&self, name: &str) -> bool {
        self.get_resource(name).is_some()
    }

    pub fn save_resource(&mut self, name: &str, resource: impl Into<Value>) {
        self.resources.insert(name.to_string(), resource.into());
    }

    /// Saves a resource that nested packages inherit.
    pub fn save_pushable_resource(&mut self, name: &str, resource: impl Into<Value>) {
        self.pushable_resources.insert(name.to_string(), resource.into());
    }

    pub fn get_or_create_resource(
        &mut self,
        name: &str,
        default: impl Into<Value>,
        pushable: bool,
    ) -> &mut Value {
        if self.resources.contains_key(name) {
            return self.resources.entry(name.to_string()).or_insert(Value::Null);
        }
        let map = if pushable || self.pushable_resources.contains_key(name) {
            &mut self.pushable_resources
        } else {
            &mut self.resources
        };
        map.entry(name.to_string()).or_insert_with(|| default.into())
    }

    pub fn pushable_resources(&self) -> &HashMap<String, Value> {
        &self.pushable_resources
    }

    // Metadata and features

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn set_metadata(&mut self, key: &str, value: impl Into<Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    pub fn feature_profile(&self) -> &FeatureProfile {
        &self.feature_profile
    }

    pub fn log_feature(
        &mut self,
        tag: &str,
        file: &FileRef,
        line: Option<usize>,
        column: Option<usize>,
    ) {
        self.feature_profile.log_feature(
            tag,
            FeatureUsage { file: file.clone(), line, column },
        );
    }

    // Output

    pub fn to_json(&self) -> ReportResult<Value> {
        let mut metadata = self.metadata.clone();
        if !self.feature_profile.is_empty() {
            let (tags, usage) = self.feature_profile.to_json();
            metadata.insert("feature_profile".into(), tags);
            metadata.insert("feature_usage".into(), usage);
        }

        let snapshot = ReportSnapshot {
            ending_tier: self.ending_tier,
            success: !self.failed(false),
            errors: self.errors.len(),
            warnings: self.warnings.len(),
            notices: self.notices.len(),
            messages: self.messages().cloned().collect(),
            manifest: self.resources.get("manifest").cloned().unwrap_or(Value::Null),
            metadata: Value::Object(metadata),
        };
        Ok(serde_json::to_value(snapshot)?)
    }

    pub fn render_json(&self) -> ReportResult<String> {
        Ok(serde_json::to_string(&self.to_json()?)?)
    }

    /// Renders the human summary with colour markers resolved.
    pub fn print_summary(&self, verbose: bool, no_color: bool) -> String {
        let mut handler = OutputHandler::new(no_color);
        handler.write("\n<<GREEN>>Summary:").write(&"-".repeat(30));

        if self.failed(true) {
            handler.write("<<BLUE>>Test failed! Errors:");
            for error in &self.errors {
                print_message(&mut handler, "<<RED>>Error:<<NORMAL>>\t", error, verbose);
            }
            for warning in &self.warnings {
                print_message(&mut handler, "<<YELLOW>>Warning:<<NORMAL>> ", warning, verbose);
            }
        } else {
            handler.write("<<GREEN>>All tests succeeded!");
        }

        for notice in &self.notices {
            print_message(&mut handler, "<<WHITE>>Notice:<<NORMAL>>\t", notice, verbose);
        }

        handler.write("\n");
        if self.unfinished {
            handler.write("<<RED>>Validation terminated early");
            handler.write("Errors during validation are preventing the validation process from completing.");
            handler.write("Use the <<YELLOW>>--determined<<NORMAL>> flag to ignore these errors.");
            handler.write("\n");
        }

        handler.into_string()
    }
}

fn print_message(handler: &mut OutputHandler, prefix: &str, message: &Message, verbose: bool) {
    let mut output = format!("\n{}{}\n", prefix, message.message.flatten());

    if verbose {
        let mut details = Vec::new();
        if !message.description.is_empty() {
            details.push(message.description.flatten());
        }
        details.push(format!("\tTier:\t{}", message.tier));
        if !message.file.is_empty() {
            details.push(format!("\tFile:\t{}", message.file));
        }
        if let Some(line) = message.line.filter(|l| *l > 0) {
            details.push(format!("\tLine:\t{}", line));
        }
        if let Some(column) = message.column.filter(|c| *c > 0) {
            details.push(format!("\tColumn:\t{}", column));
        }
        if let Some(context) = &message.context {
            details.push("\tContext:".to_string());
            for line in context {
                details.push(match line {
                    Some(line) => format!("\t> {}", line),
                    None => format!("\t>{}", "-".repeat(20)),
                });
            }
        }
        output.push('\n');
        output.push_str(&details.join("\n"));
    }

    handler.write(&output);
}

/// The JSON form of a finished report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub ending_tier: u8,
    pub success: bool,
    pub errors: usize,
    pub warnings: usize,
    pub notices: usize,
    pub messages: Vec<Message>,
    pub manifest: Value,
    pub metadata: Value,
}

impl ReportSnapshot {
    pub fn from_json(data: &str) -> ReportResult<Self> {
        let snapshot: ReportSnapshot = serde_json::from_str(data)?;
        let counted = snapshot.messages.iter().fold([0usize; 3], |mut acc, m| {
            acc[m.kind as usize] += 1;
            acc
        });
        if counted != [snapshot.errors, snapshot.warnings, snapshot.notices] {
            return Err(ReportError::Malformed(
                "message counts do not match the message list".to_string(),
            ));
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextGenerator;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_completeness() {
        let mut bundle = ErrorBundle::default();
        bundle.error(
            Diagnostic::new(["id"], "error")
                .description("description")
                .file("file")
                .line(123)
                .column(456),
        );

        let results = bundle.to_json().unwrap();
        let messages = results["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        let message = &messages[0];
        assert_eq!(message["id"], serde_json::json!(["id"]));
        assert_eq!(message["message"], "error");
        assert_eq!(message["description"], "description");
        assert_eq!(message["file"], "file");
        assert_eq!(message["line"], 123);
        assert_eq!(message["column"], 456);
        assert_eq!(message["type"], "error");
        assert_eq!(message["uid"].as_str().unwrap().len(), 32);
    }

    #[test]
    fn test_json_tiers_and_success() {
        let mut bundle = ErrorBundle::default();
        bundle.set_tier(4);
        bundle.set_tier(3);
        bundle.error(Diagnostic::new(["e"], "error").description("description"));
        bundle.warning(Diagnostic::new(["w"], "warning").description("description"));
        bundle.notice(Diagnostic::new(["n"], "notice").description("description"));

        let results = bundle.to_json().unwrap();
        assert_eq!(results["messages"].as_array().unwrap().len(), 3);
        assert_eq!(results["success"], false);
        assert_eq!(results["ending_tier"], 4);
        assert_eq!(results["messages"][0]["tier"], 3);
    }

    #[test]
    fn test_success_ignores_warnings() {
        let mut bundle = ErrorBundle::default();
        bundle.warning(Diagnostic::new(["w"], "warning"));
        let results = bundle.to_json().unwrap();
        assert_eq!(results["success"], true);
        assert!(bundle.failed(true));
        assert!(!bundle.failed(false));
    }

    #[test]
    fn test_duplicates_dropped() {
        let mut bundle = ErrorBundle::default();
        assert!(bundle.error(Diagnostic::new(["a", "foo", "c"], "Test").file("x.js").line(3)));
        assert!(!bundle.error(Diagnostic::new(["a", "foo", "c"], "Test").file("x.js").line(3)));
        assert!(!bundle.warning(Diagnostic::new(["a", "foo", "c"], "Other").file("x.js").line(3)));
        assert!(bundle.error(Diagnostic::new(["a", "foo", "c"], "Test").file("x.js").line(4)));
        assert_eq!(bundle.messages().count(), 2);
    }

    #[test]
    fn test_context_from_generator() {
        let generator = ContextGenerator::new("x\ny\nz\n");
        let mut bundle = ErrorBundle::default();
        bundle.warning(
            Diagnostic::new(["ctx"], "Context test").line(2).column(0).context_from(&generator),
        );
        let results = bundle.to_json().unwrap();
        assert_eq!(results["messages"][0]["context"], serde_json::json!(["x", "y", "z"]));
    }

    #[test]
    fn test_missing_line_and_column_render_null() {
        let mut bundle = ErrorBundle::default();
        bundle.notice(Diagnostic::new(["none"], "none"));
        let results = bundle.to_json().unwrap();
        assert!(results["messages"][0]["line"].is_null());
        assert!(results["messages"][0]["column"].is_null());
        assert!(results["messages"][0]["context"].is_null());
    }

    #[test]
    fn test_discard_unused_messages() {
        let mut bundle = ErrorBundle::default();
        bundle.set_tier(1);
        bundle.error(Diagnostic::new(["one"], "one"));
        bundle.set_tier(2);
        bundle.warning(Diagnostic::new(["two"], "two"));
        bundle.set_tier(3);
        bundle.notice(Diagnostic::new(["three"], "three"));

        bundle.discard_unused_messages(2);
        let ids: Vec<_> = bundle.messages().map(|m| m.id[0].clone()).collect();
        assert_eq!(ids, vec!["one", "two"]);

        bundle.discard_unused_messages(2);
        assert_eq!(bundle.messages().count(), 2);
    }

    #[test]
    fn test_initial_resources() {
        assert!(ErrorBundle::new(true).resource_flag("listed"));
        assert!(!ErrorBundle::new(false).resource_flag("listed"));
        assert!(ErrorBundle::default().determined);
        assert!(ErrorBundle::default().get_resource("missing").is_none());
    }

    #[test]
    fn test_get_or_create_resource() {
        let mut bundle = ErrorBundle::default();
        bundle.get_or_create_resource("http_cache", serde_json::json!({}), true);
        assert!(bundle.pushable_resources().contains_key("http_cache"));

        bundle.save_resource("app_type", "web");
        let value = bundle.get_or_create_resource("app_type", "privileged", false);
        assert_eq!(*value, "web");
    }

    #[test]
    fn test_summary_layout() {
        let mut bundle = ErrorBundle::default();
        bundle.error(Diagnostic::new(["e"], "error").file("file1").line(123));
        bundle.warning(Diagnostic::new(["w"], "warning").file(vec!["sub.zip".to_string(), "".to_string()]));
        bundle.notice(Diagnostic::new(["n"], "foobar"));

        let brief = bundle.print_summary(false, true);
        let verbose = bundle.print_summary(true, true);
        assert!(brief.len() < verbose.len());
        assert!(brief.contains("Test failed! Errors:"));
        assert!(verbose.contains("\tFile:\tfile1"));
        assert!(verbose.contains("\tLine:\t123"));
        assert!(verbose.contains("sub.zip > (none)"));
        assert!(verbose.contains("foobar"));
        assert!(!verbose.contains("<<"));
    }

    #[test]
    fn test_summary_success_and_unfinished() {
        let mut bundle = ErrorBundle::default();
        assert!(bundle.print_summary(false, true).contains("All tests succeeded!"));

        bundle.unfinished = true;
        assert!(bundle.print_summary(false, true).contains("Validation terminated early"));
    }

    #[test]
    fn test_snapshot_reload() {
        let mut bundle = ErrorBundle::default();
        bundle.save_resource("manifest", serde_json::json!({"name": "X"}));
        bundle.set_metadata("ran_js_tests", "yes");
        bundle.error(Diagnostic::new(["a"], "A").file("f").line(1).column(2));
        bundle.log_feature("APPS", &FileRef::from("app.js"), Some(1), Some(0));

        let rendered = bundle.render_json().unwrap();
        let snapshot = ReportSnapshot::from_json(&rendered).unwrap();
        assert_eq!(serde_json::to_value(&snapshot).unwrap(), bundle.to_json().unwrap());
        assert_eq!(snapshot.manifest["name"], "X");
        assert_eq!(snapshot.metadata["feature_profile"], serde_json::json!(["APPS"]));
    }
}
