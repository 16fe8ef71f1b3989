//! Report plumbing for the app validator
//!
//! Everything a validation run produces flows through an [`ErrorBundle`]:
//! errors, warnings and notices, the resources tests hand to each other,
//! run metadata, and the profile of platform features the app touches.

pub mod bundle;
pub mod context;
pub mod csp;
pub mod error;
pub mod features;
pub mod message;
pub mod output;

pub use bundle::{ErrorBundle, ReportSnapshot};
pub use context::ContextGenerator;
pub use csp::{warn_csp, CspSeverity};
pub use error::{ReportError, ReportResult};
pub use features::{FeatureProfile, FeatureUsage};
pub use message::{ContextWindow, Diagnostic, FileRef, Message, MessageKind, Text};
pub use output::OutputHandler;
