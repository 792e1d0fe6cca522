//! User management endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::user::{UserInfo, UserQuery},
    AppState,
};

use super::{AuthenticatedUser, MessageResponse, PaginatedResponse, UserPage};

/// List users with search, filters and pagination
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    params(UserQuery),
    responses(
        (status = 200, description = "List of users", body = UserPage),
        (status = 400, description = "Invalid sort key", body = crate::error::ErrorResponse),
        (status = 403, description = "Admin role required", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<PaginatedResponse<UserInfo>>> {
    claims.require_admin()?;

    let (users, total) = state.services.users.find_all(&query).await?;

    Ok(Json(PaginatedResponse {
        items: users.into_iter().map(UserInfo::from).collect(),
        total,
        page: query.page.unwrap_or(1).max(1),
        limit: query.limit.unwrap_or(0).max(0),
    }))
}

/// Get user details by ID; readers may only see themselves
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User details", body = UserInfo),
        (status = 403, description = "Not allowed", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserInfo>> {
    if claims.user_id != id && !claims.is_admin() {
        return Err(AppError::Authorization("Cannot view other users".to_string()));
    }

    let user = state.services.users.get_by_id(id).await?;
    Ok(Json(user.into()))
}

/// Promote a user to admin
#[utoipa::path(
    post,
    path = "/users/{id}/assign-admin",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User promoted", body = UserInfo),
        (status = 400, description = "User already has admin role", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn assign_admin(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserInfo>> {
    claims.require_admin()?;

    let user = state.services.users.assign_admin(id).await?;
    Ok(Json(user.into()))
}

/// Soft-delete a user without active loans
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 400, description = "User has borrowed books", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    claims.require_admin()?;

    state.services.users.delete(id).await?;
    Ok(Json(MessageResponse::new("User deleted")))
}
