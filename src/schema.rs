//! Response types for the processing endpoint.

use serde::Serialize;

use crate::entities::EntityReport;
use crate::vitals::Vitals;

/// Which backend produced each stage's output.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StageBackends {
    pub acquisition: String,
    pub entities: Option<String>,
    pub summary: Option<String>,
    pub translation: Option<String>,
}

/// Result of processing one uploaded document.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub id: String,
    pub filename: String,
    /// Hex SHA-256 of the uploaded bytes.
    pub content_hash: String,
    /// Normalized text, cut for transport (see `text_truncated`).
    pub text: String,
    /// Character count of the full normalized text.
    pub text_length: usize,
    pub text_truncated: bool,
    pub entities: EntityReport,
    pub entities_pretty: EntityReport,
    pub vitals: Vitals,
    pub summary: String,
    pub translation: String,
    pub target_language: String,
    pub backends: StageBackends,
    /// Degraded paths taken while processing. Always present.
    pub warnings: Vec<String>,
}
