//! crates/manuscript_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any web framework or serialization format.

use std::fmt;
use std::str::FromStr;

/// The two supported transformation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowKind {
    /// Markdown-tagged article conversion.
    Markdown,
    /// Question/answer transcript conversion.
    Qa,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 2] = [WorkflowKind::Markdown, WorkflowKind::Qa];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::Markdown => "markdown",
            WorkflowKind::Qa => "qa",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markdown" => Ok(WorkflowKind::Markdown),
            "qa" => Ok(WorkflowKind::Qa),
            other => Err(format!("Unknown workflow kind '{}'", other)),
        }
    }
}

/// How the bytes of an uploaded manuscript should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    PlainText,
    StructuredDocument,
}

impl SourceType {
    /// Picks the source type from a file name's extension (`.txt` or `.docx`).
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "txt" => Some(SourceType::PlainText),
            "docx" => Some(SourceType::StructuredDocument),
            _ => None,
        }
    }
}

/// Raw manuscript bytes plus the declared source type.
#[derive(Debug, Clone)]
pub struct ManuscriptInput {
    pub bytes: Vec<u8>,
    pub source_type: SourceType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("Unknown role '{}'", other)),
        }
    }
}

/// A login account. `password_hash` is a salted Argon2 PHC string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: Role,
}

/// Outcome of a convert or revise call against the generation service.
///
/// Exactly one of `payload` / `error` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub success: bool,
    pub payload: Option<String>,
    pub error: Option<String>,
}

impl ConversionResult {
    pub fn ok(payload: String) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

/// Outcome of a proofreading pass.
///
/// `issue_count` is a heuristic count of findings markers in the report,
/// only a display hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofreadResult {
    pub success: bool,
    pub report: String,
    pub issue_count: usize,
    pub error: Option<String>,
}

impl ProofreadResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            report: String::new(),
            issue_count: 0,
            error: Some(error.into()),
        }
    }
}

/// The page a logged-in user is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Page {
    #[default]
    Main,
    Admin,
}

impl Page {
    pub fn as_str(&self) -> &'static str {
        match self {
            Page::Main => "main",
            Page::Admin => "admin",
        }
    }
}

impl FromStr for Page {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(Page::Main),
            "admin" => Ok(Page::Admin),
            other => Err(format!("Unknown page '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_follows_extension() {
        assert_eq!(SourceType::from_file_name("memo.txt"), Some(SourceType::PlainText));
        assert_eq!(
            SourceType::from_file_name("Article.Final.DOCX"),
            Some(SourceType::StructuredDocument)
        );
        assert_eq!(SourceType::from_file_name("scan.pdf"), None);
        assert_eq!(SourceType::from_file_name("no_extension"), None);
    }

    #[test]
    fn workflow_kind_parses_path_segments() {
        assert_eq!("qa".parse::<WorkflowKind>(), Ok(WorkflowKind::Qa));
        assert_eq!("markdown".parse::<WorkflowKind>(), Ok(WorkflowKind::Markdown));
        assert!("html".parse::<WorkflowKind>().is_err());
    }

    #[test]
    fn conversion_result_carries_exactly_one_side() {
        let ok = ConversionResult::ok("body".into());
        assert!(ok.success && ok.payload.is_some() && ok.error.is_none());
        let failed = ConversionResult::failed("boom");
        assert!(!failed.success && failed.payload.is_none());
        assert_eq!(failed.error.as_deref(), Some("boom"));
    }
}
