//! Authors endpoints

use axum::{
    Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post, put},
};
use serde_json::Value;

use super::dto::{AuthorInput, AuthorView, MessageResponse, parse_author};
use crate::AppState;
use crate::auth::require_auth;
use crate::error::AppError;

pub fn authors_router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/api/authors", get(list_authors))
        .route("/api/authors/:id", get(get_author));

    let protected = Router::new()
        .route("/api/authors", post(create_author))
        .route("/api/authors/:id", put(update_author).delete(delete_author))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    public.merge(protected)
}

/// List all authors
#[utoipa::path(
    get,
    path = "/api/authors",
    tag = "Authors",
    responses(
        (status = 200, description = "All authors", body = [AuthorView]),
        (status = 500, description = "Server error", body = MessageResponse)
    )
)]
pub(crate) async fn list_authors(
    State(state): State<AppState>,
) -> Result<Json<Vec<AuthorView>>, AppError> {
    let authors = state.db.list_authors().await?;
    Ok(Json(authors.into_iter().map(AuthorView::from).collect()))
}

/// Fetch one author
#[utoipa::path(
    get,
    path = "/api/authors/{id}",
    tag = "Authors",
    params(("id" = String, Path, description = "Author id")),
    responses(
        (status = 200, description = "The author", body = AuthorView),
        (status = 404, description = "Author not found", body = MessageResponse),
        (status = 500, description = "Server error", body = MessageResponse)
    )
)]
pub(crate) async fn get_author(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AuthorView>, AppError> {
    let author = state
        .db
        .get_author(&id)
        .await?
        .ok_or(AppError::NotFound("Author"))?;

    Ok(Json(author.into()))
}

/// Create an author
#[utoipa::path(
    post,
    path = "/api/authors",
    tag = "Authors",
    request_body = AuthorInput,
    responses(
        (status = 201, description = "Author created", body = AuthorView),
        (status = 400, description = "Validation failed", body = MessageResponse),
        (status = 401, description = "No valid session", body = MessageResponse),
        (status = 500, description = "Server error", body = MessageResponse)
    ),
    security(("sessionCookie" = []), ("bearerAuth" = []))
)]
pub(crate) async fn create_author(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthorView>), AppError> {
    let Json(body) = payload?;
    let fields = parse_author(&body)?;

    let author = state.db.insert_author(&fields).await?;
    tracing::info!(author_id = %author.id, "author created");

    Ok((StatusCode::CREATED, Json(author.into())))
}

/// Replace an author
#[utoipa::path(
    put,
    path = "/api/authors/{id}",
    tag = "Authors",
    params(("id" = String, Path, description = "Author id")),
    request_body = AuthorInput,
    responses(
        (status = 200, description = "Author replaced", body = AuthorView),
        (status = 400, description = "Validation failed", body = MessageResponse),
        (status = 401, description = "No valid session", body = MessageResponse),
        (status = 404, description = "Author not found", body = MessageResponse),
        (status = 500, description = "Server error", body = MessageResponse)
    ),
    security(("sessionCookie" = []), ("bearerAuth" = []))
)]
pub(crate) async fn update_author(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<AuthorView>, AppError> {
    let Json(body) = payload?;
    let fields = parse_author(&body)?;

    let author = state
        .db
        .update_author(&id, &fields)
        .await?
        .ok_or(AppError::NotFound("Author"))?;
    tracing::info!(author_id = %author.id, "author updated");

    Ok(Json(author.into()))
}

/// Delete an author
///
/// Books by this author are kept; their `author` becomes `null`.
#[utoipa::path(
    delete,
    path = "/api/authors/{id}",
    tag = "Authors",
    params(("id" = String, Path, description = "Author id")),
    responses(
        (status = 200, description = "Author deleted", body = MessageResponse),
        (status = 401, description = "No valid session", body = MessageResponse),
        (status = 404, description = "Author not found", body = MessageResponse),
        (status = 500, description = "Server error", body = MessageResponse)
    ),
    security(("sessionCookie" = []), ("bearerAuth" = []))
)]
pub(crate) async fn delete_author(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    if !state.db.delete_author(&id).await? {
        return Err(AppError::NotFound("Author"));
    }
    tracing::info!(author_id = %id, "author deleted");

    Ok(Json(MessageResponse::new("Author deleted")))
}
