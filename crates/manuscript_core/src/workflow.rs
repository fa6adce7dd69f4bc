//! crates/manuscript_core/src/workflow.rs
//!
//! The per-session state machine.
//!
//! A `SessionContext` is either logged out or logged in on the main or admin page.
//! Inside the main page the markdown and question/answer workflows run independently,
//! each moving between Idle, Converted and Proofread. Handlers take `&mut self`, so a
//! session can only have one conversion, proofread or revision in flight at a time.

use std::str::FromStr;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::credentials::{AuthFailure, CredentialStore};
use crate::domain::{
    ConversionResult, ManuscriptInput, Page, ProofreadResult, Role, SourceType, UserRecord,
    WorkflowKind,
};
use crate::extract::{self, ExtractError};
use crate::gateway::ConversionGateway;
use crate::ports::PortError;

const DEFAULT_BASE_NAME: &str = "article";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M";

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("The generation service is not configured. Set OPENAI_API_KEY and restart the service.")]
    MissingCredential,
    #[error(transparent)]
    MalformedDocument(#[from] ExtractError),
    #[error("{0}")]
    Validation(String),
    /// The message returned by the gateway, shown unchanged.
    #[error("{0}")]
    Service(String),
    #[error("The username '{0}' is already in use")]
    DuplicateUsername(String),
    #[error("Invalid username or password")]
    Authentication(AuthFailure),
    #[error("Not logged in")]
    NotAuthenticated,
    #[error("Administrator role required")]
    Forbidden,
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Who is logged in to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub display_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Converted,
    Proofread,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Converted => "converted",
            Phase::Proofread => "proofread",
        }
    }
}

/// The downloadable text artifacts of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Result,
    Report,
}

impl FromStr for Artifact {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "result" => Ok(Artifact::Result),
            "report" => Ok(Artifact::Report),
            other => Err(format!("Unknown artifact '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: String,
    pub content: String,
}

/// An uploaded manuscript file.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ConvertRequest {
    /// Wins over `pasted_text` when both are present.
    pub upload: Option<Upload>,
    pub pasted_text: Option<String>,
    /// Only used by the markdown workflow.
    pub reporter_name: Option<String>,
    pub proofread: bool,
}

#[derive(Debug, Clone)]
pub struct ConvertOutcome {
    pub result: String,
    /// Present when proofreading was requested, whether or not it succeeded.
    pub proofread: Option<ProofreadResult>,
}

/// Artifacts of one workflow kind.
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    result: Option<String>,
    proofread: Option<ProofreadResult>,
    revision_history: Vec<String>,
    source_name: Option<String>,
}

impl WorkflowState {
    pub fn phase(&self) -> Phase {
        match (&self.result, &self.proofread) {
            (None, _) => Phase::Idle,
            (Some(_), None) => Phase::Converted,
            (Some(_), Some(_)) => Phase::Proofread,
        }
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn proofread(&self) -> Option<&ProofreadResult> {
        self.proofread.as_ref()
    }

    pub fn revision_history(&self) -> &[String] {
        &self.revision_history
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    /// Names an artifact `{base}_{timestamp}.txt` or `{base}_proofread_{timestamp}.txt`.
    pub fn download(&self, artifact: Artifact, now: NaiveDateTime) -> Option<Download> {
        let base = self
            .source_name
            .as_deref()
            .map(|name| name.rsplit_once('.').map_or(name, |(stem, _)| stem))
            .filter(|stem| !stem.is_empty())
            .unwrap_or(DEFAULT_BASE_NAME);
        let timestamp = now.format(TIMESTAMP_FORMAT);

        match artifact {
            Artifact::Result => self.result.as_ref().map(|content| Download {
                file_name: format!("{}_{}.txt", base, timestamp),
                content: content.clone(),
            }),
            Artifact::Report => self.proofread.as_ref().map(|report| Download {
                file_name: format!("{}_proofread_{}.txt", base, timestamp),
                content: report.report.clone(),
            }),
        }
    }
}

/// Everything one browser session holds between requests.
#[derive(Debug, Default)]
pub struct SessionContext {
    identity: Option<Identity>,
    page: Page,
    markdown: WorkflowState,
    qa: WorkflowState,
    input_generation: u64,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    //-------------------------------------------------------------------------------------
    // Authentication and navigation
    //-------------------------------------------------------------------------------------

    pub async fn login(
        &mut self,
        store: &CredentialStore,
        username: &str,
        password: &str,
    ) -> Result<&Identity, WorkflowError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(WorkflowError::Validation(
                "Enter a username and a password".to_string(),
            ));
        }

        let record = store.authenticate(username, password).await.map_err(|failure| {
            warn!("Login rejected for '{}': {}", username, failure);
            WorkflowError::Authentication(failure)
        })?;

        *self = Self::default();
        info!("'{}' logged in.", record.username);
        Ok(self.identity.insert(Identity {
            username: record.username,
            display_name: record.display_name,
            role: record.role,
        }))
    }

    /// Drops every artifact and the identity. The credential table is not touched.
    pub fn logout(&mut self) {
        if let Some(identity) = &self.identity {
            info!("'{}' logged out.", identity.username);
        }
        *self = Self::default();
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn navigate(&mut self, page: Page) -> Result<(), WorkflowError> {
        if page == Page::Admin {
            self.require_admin()?;
        } else {
            self.require_login()?;
        }
        self.page = page;
        Ok(())
    }

    pub fn require_login(&self) -> Result<&Identity, WorkflowError> {
        self.identity.as_ref().ok_or(WorkflowError::NotAuthenticated)
    }

    pub fn require_admin(&self) -> Result<&Identity, WorkflowError> {
        let identity = self.require_login()?;
        if identity.role == Role::Admin {
            Ok(identity)
        } else {
            Err(WorkflowError::Forbidden)
        }
    }

    //-------------------------------------------------------------------------------------
    // Conversion workflows
    //-------------------------------------------------------------------------------------

    pub fn workflow(&self, kind: WorkflowKind) -> &WorkflowState {
        match kind {
            WorkflowKind::Markdown => &self.markdown,
            WorkflowKind::Qa => &self.qa,
        }
    }

    fn workflow_mut(&mut self, kind: WorkflowKind) -> &mut WorkflowState {
        match kind {
            WorkflowKind::Markdown => &mut self.markdown,
            WorkflowKind::Qa => &mut self.qa,
        }
    }

    /// Counter bumped by every clear; clients re-key their input fields on change.
    pub fn input_generation(&self) -> u64 {
        self.input_generation
    }

    /// Extracts the manuscript, converts it and optionally proofreads the result.
    ///
    /// A failed conversion leaves the previous artifacts of this workflow untouched.
    /// A failed proofread keeps the new conversion and only reports the error.
    pub async fn convert(
        &mut self,
        gateway: &ConversionGateway,
        kind: WorkflowKind,
        request: ConvertRequest,
    ) -> Result<ConvertOutcome, WorkflowError> {
        self.require_login()?;
        let (text, source_name) = manuscript_text(&request)?;

        let reporter_name = match kind {
            WorkflowKind::Markdown => request.reporter_name.as_deref(),
            WorkflowKind::Qa => None,
        };
        let converted = into_payload(gateway.convert(&text, kind, reporter_name).await)?;

        let state = self.workflow_mut(kind);
        state.result = Some(converted.clone());
        state.proofread = None;
        state.revision_history.clear();
        state.source_name = source_name;

        let proofread = if request.proofread {
            let report = gateway.proofread(&converted, kind).await;
            if report.success {
                self.workflow_mut(kind).proofread = Some(report.clone());
            }
            Some(report)
        } else {
            None
        };

        Ok(ConvertOutcome {
            result: converted,
            proofread,
        })
    }

    /// Proofreads the current result on demand. A failure keeps any earlier report.
    pub async fn proofread(
        &mut self,
        gateway: &ConversionGateway,
        kind: WorkflowKind,
    ) -> Result<ProofreadResult, WorkflowError> {
        self.require_login()?;
        let current = self
            .workflow(kind)
            .result
            .clone()
            .ok_or_else(|| WorkflowError::Validation("Convert a manuscript first".to_string()))?;

        let report = gateway.proofread(&current, kind).await;
        if !report.success {
            return Err(WorkflowError::Service(report.error.unwrap_or_default()));
        }
        self.workflow_mut(kind).proofread = Some(report.clone());
        Ok(report)
    }

    /// Applies a revision request to the current result.
    ///
    /// Success replaces the result, appends the request to the history and drops the
    /// proofread report, which no longer describes the text.
    pub async fn revise(
        &mut self,
        gateway: &ConversionGateway,
        kind: WorkflowKind,
        revision_request: &str,
    ) -> Result<String, WorkflowError> {
        self.require_login()?;
        let revision_request = revision_request.trim();
        if revision_request.is_empty() {
            return Err(WorkflowError::Validation(
                "Describe the change you want".to_string(),
            ));
        }
        let current = self
            .workflow(kind)
            .result
            .clone()
            .ok_or_else(|| WorkflowError::Validation("Convert a manuscript first".to_string()))?;

        let revised = into_payload(gateway.revise(&current, revision_request, kind).await)?;

        let state = self.workflow_mut(kind);
        state.result = Some(revised.clone());
        state.proofread = None;
        state.revision_history.push(revision_request.to_string());
        info!(
            "{} result revised ({} revisions so far).",
            kind,
            state.revision_history.len()
        );
        Ok(revised)
    }

    /// Resets one workflow to Idle and bumps the input generation. Returns the new value.
    pub fn clear(&mut self, kind: WorkflowKind) -> u64 {
        *self.workflow_mut(kind) = WorkflowState::default();
        self.input_generation += 1;
        self.input_generation
    }

    //-------------------------------------------------------------------------------------
    // Account administration
    //-------------------------------------------------------------------------------------

    pub async fn list_users(&self, store: &CredentialStore) -> Result<Vec<UserRecord>, WorkflowError> {
        self.require_admin()?;
        Ok(store.get().await.into_values().collect())
    }

    pub async fn add_user(
        &self,
        store: &CredentialStore,
        username: &str,
        display_name: &str,
        password: &str,
        role: Role,
    ) -> Result<(), WorkflowError> {
        self.require_admin()?;
        let username = username.trim();
        let display_name = display_name.trim();
        if username.is_empty() || display_name.is_empty() || password.is_empty() {
            return Err(WorkflowError::Validation(
                "Username, display name and password are all required".to_string(),
            ));
        }

        store
            .create(username, display_name, password, role)
            .await
            .map_err(|e| match e {
                PortError::AlreadyExists(name) => WorkflowError::DuplicateUsername(name),
                other => WorkflowError::Port(other),
            })
    }

    /// Deletes an account; the protected administrator and unknown names are a no-op.
    pub async fn remove_user(
        &self,
        store: &CredentialStore,
        username: &str,
    ) -> Result<bool, WorkflowError> {
        self.require_admin()?;
        Ok(store.remove(username).await?)
    }
}

/// Resolves the request to manuscript text and the name downloads are based on.
fn manuscript_text(request: &ConvertRequest) -> Result<(String, Option<String>), WorkflowError> {
    let (text, source_name) = match (&request.upload, &request.pasted_text) {
        (Some(upload), _) => {
            let source_type = SourceType::from_file_name(&upload.file_name).ok_or_else(|| {
                WorkflowError::Validation(format!(
                    "'{}' is not a .docx or .txt file",
                    upload.file_name
                ))
            })?;
            let input = ManuscriptInput {
                bytes: upload.bytes.clone(),
                source_type,
            };
            (extract::extract(&input)?, Some(upload.file_name.clone()))
        }
        (None, Some(text)) => (text.clone(), None),
        (None, None) => {
            return Err(WorkflowError::Validation(
                "Upload a manuscript file or paste its text".to_string(),
            ))
        }
    };

    if text.trim().is_empty() {
        return Err(WorkflowError::Validation(
            "No text could be extracted from the manuscript".to_string(),
        ));
    }
    Ok((text, source_name))
}

fn into_payload(result: ConversionResult) -> Result<String, WorkflowError> {
    match result {
        ConversionResult {
            success: true,
            payload: Some(payload),
            ..
        } => Ok(payload),
        ConversionResult { error, .. } => Err(WorkflowError::Service(
            error.unwrap_or_else(|| "The generation service returned nothing".to_string()),
        )),
    }
}
