//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the session and conversion workflow endpoints and
//! the master definition for the OpenAPI specification.

use crate::web::{
    admin, auth,
    state::{AppState, SessionHandle},
};
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use manuscript_core::{
    Artifact, ConversionGateway, ConvertRequest, Page, ProofreadResult, SessionContext, Upload,
    WorkflowError, WorkflowKind,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::logout_handler,
        session_handler,
        change_page_handler,
        workflow_handler,
        convert_handler,
        proofread_handler,
        revise_handler,
        clear_handler,
        download_handler,
        admin::list_users_handler,
        admin::add_user_handler,
        admin::delete_user_handler,
    ),
    components(
        schemas(
            auth::LoginRequest, auth::LoginResponse, SessionView, ChangePageRequest,
            ConvertForm, WorkflowView, ProofreadView, ConvertResponse, ReviseRequest, ClearResponse,
            admin::UserView, admin::AddUserRequest, admin::DeleteUserResponse
        )
    ),
    tags(
        (name = "Manuscript Converter API", description = "Convert newsroom manuscripts into markdown articles or Q&A transcripts.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Turns a workflow error into the status and message shown to the user.
pub fn reject(e: WorkflowError) -> (StatusCode, String) {
    let status = match &e {
        WorkflowError::MissingCredential => StatusCode::SERVICE_UNAVAILABLE,
        WorkflowError::MalformedDocument(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Validation(_) => StatusCode::BAD_REQUEST,
        WorkflowError::Service(_) => StatusCode::BAD_GATEWAY,
        WorkflowError::DuplicateUsername(_) => StatusCode::CONFLICT,
        WorkflowError::Authentication(_) | WorkflowError::NotAuthenticated => {
            StatusCode::UNAUTHORIZED
        }
        WorkflowError::Forbidden => StatusCode::FORBIDDEN,
        WorkflowError::Port(port_error) => {
            error!("Port failure while handling request: {:?}", port_error);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal error occurred".to_string(),
            );
        }
    };
    (status, e.to_string())
}

fn parse_kind(raw: &str) -> Result<WorkflowKind, (StatusCode, String)> {
    raw.parse::<WorkflowKind>()
        .map_err(|e| (StatusCode::NOT_FOUND, e))
}

fn require_gateway(state: &AppState) -> Result<Arc<ConversionGateway>, (StatusCode, String)> {
    state
        .gateway
        .clone()
        .ok_or_else(|| reject(WorkflowError::MissingCredential))
}

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct SessionView {
    pub username: String,
    pub display_name: String,
    pub role: String,
    pub page: String,
    pub input_generation: u64,
    pub generation_enabled: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePageRequest {
    pub page: String,
}

#[derive(Serialize, ToSchema)]
pub struct ProofreadView {
    pub success: bool,
    pub report: String,
    /// Approximate number of findings; a display hint only.
    pub issue_count: usize,
    pub error: Option<String>,
}

impl From<&ProofreadResult> for ProofreadView {
    fn from(result: &ProofreadResult) -> Self {
        Self {
            success: result.success,
            report: result.report.clone(),
            issue_count: result.issue_count,
            error: result.error.clone(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct WorkflowView {
    pub kind: String,
    pub phase: String,
    pub result: Option<String>,
    pub proofread: Option<ProofreadView>,
    pub revision_history: Vec<String>,
    pub source_name: Option<String>,
    pub input_generation: u64,
}

impl WorkflowView {
    fn of(session: &SessionContext, kind: WorkflowKind) -> Self {
        let state = session.workflow(kind);
        Self {
            kind: kind.as_str().to_string(),
            phase: state.phase().as_str().to_string(),
            result: state.result().map(str::to_string),
            proofread: state.proofread().map(ProofreadView::from),
            revision_history: state.revision_history().to_vec(),
            source_name: state.source_name().map(str::to_string),
            input_generation: session.input_generation(),
        }
    }
}

/// The multipart form accepted by the convert endpoint. Documentation only.
#[derive(ToSchema)]
pub struct ConvertForm {
    /// A .docx or .txt manuscript. Wins over `text`.
    #[schema(value_type = Option<String>, format = Binary)]
    pub file: Option<Vec<u8>>,
    pub text: Option<String>,
    /// Markdown workflow only.
    pub reporter_name: Option<String>,
    /// Defaults to `true`; send `false` to skip proofreading.
    pub proofread: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct ConvertResponse {
    /// The proofreading outcome of this call, including a failed one.
    pub proofread: Option<ProofreadView>,
    pub workflow: WorkflowView,
}

#[derive(Deserialize, ToSchema)]
pub struct ReviseRequest {
    pub request: String,
}

#[derive(Serialize, ToSchema)]
pub struct ClearResponse {
    pub input_generation: u64,
}

//=========================================================================================
// Session Handlers
//=========================================================================================

/// Describe the logged-in user and session.
#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Current session", body = SessionView),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn session_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
) -> Result<Json<SessionView>, (StatusCode, String)> {
    let session = session.lock().await;
    let identity = session.require_login().map_err(reject)?;
    Ok(Json(SessionView {
        username: identity.username.clone(),
        display_name: identity.display_name.clone(),
        role: identity.role.as_str().to_string(),
        page: session.page().as_str().to_string(),
        input_generation: session.input_generation(),
        generation_enabled: state.gateway.is_some(),
    }))
}

/// Switch between the main page and the admin page.
#[utoipa::path(
    put,
    path = "/session/page",
    request_body = ChangePageRequest,
    responses(
        (status = 204, description = "Page changed"),
        (status = 400, description = "Unknown page"),
        (status = 403, description = "Admin page requested by a non-admin")
    )
)]
pub async fn change_page_handler(
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<ChangePageRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let page = req
        .page
        .parse::<Page>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    session.lock().await.navigate(page).map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

//=========================================================================================
// Workflow Handlers
//=========================================================================================

/// Show the current artifacts of one workflow.
#[utoipa::path(
    get,
    path = "/workflows/{kind}",
    params(("kind" = String, Path, description = "`markdown` or `qa`")),
    responses(
        (status = 200, description = "Workflow state", body = WorkflowView),
        (status = 404, description = "Unknown workflow kind")
    )
)]
pub async fn workflow_handler(
    Path(kind): Path<String>,
    Extension(session): Extension<SessionHandle>,
) -> Result<Json<WorkflowView>, (StatusCode, String)> {
    let kind = parse_kind(&kind)?;
    let session = session.lock().await;
    session.require_login().map_err(reject)?;
    Ok(Json(WorkflowView::of(&session, kind)))
}

/// Convert an uploaded or pasted manuscript, optionally proofreading the result.
#[utoipa::path(
    post,
    path = "/workflows/{kind}/convert",
    params(("kind" = String, Path, description = "`markdown` or `qa`")),
    request_body(content = ConvertForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Converted", body = ConvertResponse),
        (status = 400, description = "No manuscript or unsupported file type"),
        (status = 422, description = "The document could not be read"),
        (status = 502, description = "The generation service failed"),
        (status = 503, description = "The generation service is not configured")
    )
)]
pub async fn convert_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Extension(session): Extension<SessionHandle>,
    mut multipart: Multipart,
) -> Result<Json<ConvertResponse>, (StatusCode, String)> {
    let kind = parse_kind(&kind)?;
    let gateway = require_gateway(&state)?;

    let mut request = ConvertRequest {
        proofread: true,
        ..ConvertRequest::default()
    };
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read multipart data: {}", e),
        )
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("manuscript.txt").to_string();
                let data = field.bytes().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read file bytes: {}", e),
                    )
                })?;
                if !data.is_empty() {
                    request.upload = Some(Upload {
                        file_name,
                        bytes: data.to_vec(),
                    });
                }
            }
            "text" | "reporter_name" | "proofread" => {
                let value = field.text().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("Failed to read field '{}': {}", name, e),
                    )
                })?;
                match name.as_str() {
                    "text" => request.pasted_text = Some(value).filter(|v| !v.trim().is_empty()),
                    "reporter_name" => {
                        request.reporter_name = Some(value).filter(|v| !v.trim().is_empty())
                    }
                    _ => request.proofread = !is_switched_off(&value),
                }
            }
            other => debug!("Ignoring multipart field '{}'", other),
        }
    }

    let mut session = session.lock().await;
    let outcome = session
        .convert(&gateway, kind, request)
        .await
        .map_err(reject)?;
    info!("{} conversion finished ({} characters).", kind, outcome.result.chars().count());

    Ok(Json(ConvertResponse {
        proofread: outcome.proofread.as_ref().map(ProofreadView::from),
        workflow: WorkflowView::of(&session, kind),
    }))
}

/// Proofread the current result.
#[utoipa::path(
    post,
    path = "/workflows/{kind}/proofread",
    params(("kind" = String, Path, description = "`markdown` or `qa`")),
    responses(
        (status = 200, description = "Proofread report", body = ProofreadView),
        (status = 400, description = "Nothing converted yet"),
        (status = 502, description = "The generation service failed"),
        (status = 503, description = "The generation service is not configured")
    )
)]
pub async fn proofread_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Extension(session): Extension<SessionHandle>,
) -> Result<Json<ProofreadView>, (StatusCode, String)> {
    let kind = parse_kind(&kind)?;
    let gateway = require_gateway(&state)?;
    let report = session
        .lock()
        .await
        .proofread(&gateway, kind)
        .await
        .map_err(reject)?;
    Ok(Json(ProofreadView::from(&report)))
}

/// Apply a natural-language revision request to the current result.
#[utoipa::path(
    post,
    path = "/workflows/{kind}/revise",
    params(("kind" = String, Path, description = "`markdown` or `qa`")),
    request_body = ReviseRequest,
    responses(
        (status = 200, description = "Revised", body = WorkflowView),
        (status = 400, description = "Empty request or nothing converted yet"),
        (status = 502, description = "The generation service failed"),
        (status = 503, description = "The generation service is not configured")
    )
)]
pub async fn revise_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<ReviseRequest>,
) -> Result<Json<WorkflowView>, (StatusCode, String)> {
    let kind = parse_kind(&kind)?;
    let gateway = require_gateway(&state)?;
    let mut session = session.lock().await;
    session
        .revise(&gateway, kind, &req.request)
        .await
        .map_err(reject)?;
    Ok(Json(WorkflowView::of(&session, kind)))
}

/// Clear one workflow's artifacts.
#[utoipa::path(
    post,
    path = "/workflows/{kind}/clear",
    params(("kind" = String, Path, description = "`markdown` or `qa`")),
    responses(
        (status = 200, description = "Cleared; inputs should be re-keyed", body = ClearResponse)
    )
)]
pub async fn clear_handler(
    Path(kind): Path<String>,
    Extension(session): Extension<SessionHandle>,
) -> Result<Json<ClearResponse>, (StatusCode, String)> {
    let kind = parse_kind(&kind)?;
    let mut session = session.lock().await;
    session.require_login().map_err(reject)?;
    Ok(Json(ClearResponse {
        input_generation: session.clear(kind),
    }))
}

/// Download the converted result or the proofread report as a text file.
#[utoipa::path(
    get,
    path = "/workflows/{kind}/download/{artifact}",
    params(
        ("kind" = String, Path, description = "`markdown` or `qa`"),
        ("artifact" = String, Path, description = "`result` or `report`")
    ),
    responses(
        (status = 200, description = "The artifact as a text file", body = String, content_type = "text/plain"),
        (status = 404, description = "Nothing to download")
    )
)]
pub async fn download_handler(
    Path((kind, artifact)): Path<(String, String)>,
    Extension(session): Extension<SessionHandle>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let kind = parse_kind(&kind)?;
    let artifact = artifact
        .parse::<Artifact>()
        .map_err(|e| (StatusCode::NOT_FOUND, e))?;

    let session = session.lock().await;
    session.require_login().map_err(reject)?;
    let download = session
        .workflow(kind)
        .download(artifact, chrono::Local::now().naive_local())
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Nothing to download yet".to_string()))?;

    let disposition = format!(
        "attachment; filename*=UTF-8''{}",
        percent_encode(&download.file_name)
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        download.content,
    ))
}

/// A form toggle is on unless it says otherwise.
fn is_switched_off(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "off" | "no"
    )
}

/// RFC 5987 encoding for the `filename*` parameter.
fn percent_encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}
