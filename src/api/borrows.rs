//! Borrow and return endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::borrow::{BorrowDetails, BorrowQuery, BorrowRequest, BorrowSummary, ReturnRequest},
    AppState,
};

use super::{AuthenticatedUser, BorrowPage, MessageResponse, PaginatedResponse};

/// Borrow up to five books for the current user
#[utoipa::path(
    post,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = BorrowRequest,
    responses(
        (status = 201, description = "Books borrowed", body = BorrowSummary),
        (status = 400, description = "Invalid request or book unavailable", body = crate::error::ErrorResponse),
        (status = 404, description = "User or book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_books(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<BorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowSummary>)> {
    let summary = state.services.borrows.borrow(claims.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Return books borrowed by the current user
#[utoipa::path(
    post,
    path = "/borrows/return",
    tag = "borrows",
    security(("bearer_auth" = [])),
    request_body = ReturnRequest,
    responses(
        (status = 200, description = "Books returned", body = MessageResponse),
        (status = 400, description = "Book not borrowed by the user", body = crate::error::ErrorResponse),
        (status = 404, description = "User or book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_books(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<ReturnRequest>,
) -> AppResult<Json<MessageResponse>> {
    state.services.borrows.return_books(claims.user_id, request).await?;
    Ok(Json(MessageResponse::new("Books returned")))
}

/// List borrow records; readers only see their own
#[utoipa::path(
    get,
    path = "/borrows",
    tag = "borrows",
    security(("bearer_auth" = [])),
    params(BorrowQuery),
    responses(
        (status = 200, description = "List of borrow records", body = BorrowPage),
        (status = 400, description = "Invalid sort key", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_borrows(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(mut query): Query<BorrowQuery>,
) -> AppResult<Json<PaginatedResponse<BorrowDetails>>> {
    if !claims.is_admin() {
        query.user_id = Some(claims.user_id);
    }

    let (records, total) = state.services.borrows.find_all(&query).await?;

    Ok(Json(PaginatedResponse {
        items: records,
        total,
        page: query.page.unwrap_or(1).max(1),
        limit: query.limit.unwrap_or(0).max(0),
    }))
}
