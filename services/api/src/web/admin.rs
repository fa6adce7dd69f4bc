//! services/api/src/web/admin.rs
//!
//! Account administration endpoints. Every handler requires the admin role.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use manuscript_core::{Role, PROTECTED_USERNAME};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::web::{
    rest::reject,
    state::{AppState, SessionHandle},
};

#[derive(Serialize, ToSchema)]
pub struct UserView {
    pub username: String,
    pub display_name: String,
    pub role: String,
    /// The protected administrator cannot be deleted.
    pub deletable: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct AddUserRequest {
    pub username: String,
    pub display_name: String,
    pub password: String,
    /// `admin` or `user`; defaults to `user`.
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteUserResponse {
    pub removed: bool,
}

/// List every account.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "All accounts", body = [UserView]),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn list_users_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
) -> Result<Json<Vec<UserView>>, (StatusCode, String)> {
    let users = session
        .lock()
        .await
        .list_users(&state.credentials)
        .await
        .map_err(reject)?;

    Ok(Json(
        users
            .into_iter()
            .map(|user| UserView {
                deletable: user.username != PROTECTED_USERNAME,
                username: user.username,
                display_name: user.display_name,
                role: user.role.as_str().to_string(),
            })
            .collect(),
    ))
}

/// Create an account.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = AddUserRequest,
    responses(
        (status = 201, description = "Account created"),
        (status = 400, description = "A field was blank or the role is unknown"),
        (status = 403, description = "Not an administrator"),
        (status = 409, description = "The username is taken")
    )
)]
pub async fn add_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<AddUserRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let role = match req.role.as_deref() {
        None | Some("") => Role::User,
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?,
    };

    let session = session.lock().await;
    session
        .add_user(
            &state.credentials,
            &req.username,
            &req.display_name,
            &req.password,
            role,
        )
        .await
        .map_err(reject)?;
    info!("Account '{}' created as {}.", req.username.trim(), role.as_str());
    Ok(StatusCode::CREATED)
}

/// Delete an account. Deleting `admin` or an unknown name reports `removed: false`.
#[utoipa::path(
    delete,
    path = "/admin/users/{username}",
    params(("username" = String, Path, description = "The account to delete")),
    responses(
        (status = 200, description = "Whether anything was deleted", body = DeleteUserResponse),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn delete_user_handler(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Extension(session): Extension<SessionHandle>,
) -> Result<Json<DeleteUserResponse>, (StatusCode, String)> {
    let removed = session
        .lock()
        .await
        .remove_user(&state.credentials, &username)
        .await
        .map_err(reject)?;
    Ok(Json(DeleteUserResponse { removed }))
}
