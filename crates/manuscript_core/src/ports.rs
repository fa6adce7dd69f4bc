//! crates/manuscript_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like the generation API,
//! the prompt files or wherever user accounts are kept.

use async_trait::async_trait;

use crate::domain::UserRecord;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., file system, network).
/// Document extraction is not a port and reports `ExtractError` instead.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item already exists: {0}")]
    AlreadyExists(String),
    #[error("Prompt template not found: {0}")]
    TemplateNotFound(String),
    #[error("Generation service error: {0}")]
    Service(String),
    #[error("Generation service timed out after {0}s")]
    Timeout(u64),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// One request to the generation service: a single user message and an output budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_output_tokens: u32,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Sends one message and returns the model's full text output.
    async fn generate(&self, request: &GenerationRequest) -> PortResult<String>;
}

/// The named instruction templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateName {
    MarkdownRules,
    QaRules,
}

impl TemplateName {
    pub fn file_name(&self) -> &'static str {
        match self {
            TemplateName::MarkdownRules => "markdown_rules.txt",
            TemplateName::QaRules => "qa_rules.txt",
        }
    }
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Reads a template; a missing resource is `PortError::TemplateNotFound`.
    async fn load(&self, name: TemplateName) -> PortResult<String>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Returns every stored account. An empty list means nothing was seeded.
    async fn load(&self) -> PortResult<Vec<UserRecord>>;

    /// Replaces the stored accounts with `users`.
    async fn save(&self, users: &[UserRecord]) -> PortResult<()>;
}
