//! Books endpoints

use axum::{
    Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post, put},
};
use serde_json::Value;

use super::dto::{BookInput, BookView, MessageResponse, parse_book};
use crate::AppState;
use crate::auth::require_auth;
use crate::data::BookFields;
use crate::error::AppError;

/// Reads are public; writes go through the auth gate.
pub fn books_router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/api/books", get(list_books))
        .route("/api/books/:id", get(get_book));

    let protected = Router::new()
        .route("/api/books", post(create_book))
        .route("/api/books/:id", put(update_book).delete(delete_book))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    public.merge(protected)
}

/// Rejects a book whose `authorId` points nowhere.
async fn ensure_author(state: &AppState, fields: &BookFields) -> Result<(), AppError> {
    if state.db.author_exists(&fields.author_id).await? {
        Ok(())
    } else {
        Err(AppError::Validation(
            "authorId does not reference an existing author".to_string(),
        ))
    }
}

/// List all books
#[utoipa::path(
    get,
    path = "/api/books",
    tag = "Books",
    responses(
        (status = 200, description = "All books", body = [BookView]),
        (status = 500, description = "Server error", body = MessageResponse)
    )
)]
pub(crate) async fn list_books(
    State(state): State<AppState>,
) -> Result<Json<Vec<BookView>>, AppError> {
    let books = state.db.list_books().await?;
    Ok(Json(books.into_iter().map(BookView::from).collect()))
}

/// Fetch one book
#[utoipa::path(
    get,
    path = "/api/books/{id}",
    tag = "Books",
    params(("id" = String, Path, description = "Book id")),
    responses(
        (status = 200, description = "The book", body = BookView),
        (status = 404, description = "Book not found", body = MessageResponse),
        (status = 500, description = "Server error", body = MessageResponse)
    )
)]
pub(crate) async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BookView>, AppError> {
    let book = state
        .db
        .get_book(&id)
        .await?
        .ok_or(AppError::NotFound("Book"))?;

    Ok(Json(book.into()))
}

/// Create a book
#[utoipa::path(
    post,
    path = "/api/books",
    tag = "Books",
    request_body = BookInput,
    responses(
        (status = 201, description = "Book created", body = BookView),
        (status = 400, description = "Validation failed or unknown author", body = MessageResponse),
        (status = 401, description = "No valid session", body = MessageResponse),
        (status = 500, description = "Server error", body = MessageResponse)
    ),
    security(("sessionCookie" = []), ("bearerAuth" = []))
)]
pub(crate) async fn create_book(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<BookView>), AppError> {
    let Json(body) = payload?;
    let fields = parse_book(&body)?;
    ensure_author(&state, &fields).await?;

    let book = state.db.insert_book(&fields).await?;
    tracing::info!(book_id = %book.id, author_id = %book.author_id, "book created");

    Ok((StatusCode::CREATED, Json(book.into())))
}

/// Replace a book
///
/// Full replacement: the same fields as POST are required.
#[utoipa::path(
    put,
    path = "/api/books/{id}",
    tag = "Books",
    params(("id" = String, Path, description = "Book id")),
    request_body = BookInput,
    responses(
        (status = 200, description = "Book replaced", body = BookView),
        (status = 400, description = "Validation failed or unknown author", body = MessageResponse),
        (status = 401, description = "No valid session", body = MessageResponse),
        (status = 404, description = "Book not found", body = MessageResponse),
        (status = 500, description = "Server error", body = MessageResponse)
    ),
    security(("sessionCookie" = []), ("bearerAuth" = []))
)]
pub(crate) async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<BookView>, AppError> {
    let Json(body) = payload?;
    let fields = parse_book(&body)?;
    ensure_author(&state, &fields).await?;

    let book = state
        .db
        .update_book(&id, &fields)
        .await?
        .ok_or(AppError::NotFound("Book"))?;
    tracing::info!(book_id = %book.id, "book updated");

    Ok(Json(book.into()))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/api/books/{id}",
    tag = "Books",
    params(("id" = String, Path, description = "Book id")),
    responses(
        (status = 200, description = "Book deleted", body = MessageResponse),
        (status = 401, description = "No valid session", body = MessageResponse),
        (status = 404, description = "Book not found", body = MessageResponse),
        (status = 500, description = "Server error", body = MessageResponse)
    ),
    security(("sessionCookie" = []), ("bearerAuth" = []))
)]
pub(crate) async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    if !state.db.delete_book(&id).await? {
        return Err(AppError::NotFound("Book"));
    }
    tracing::info!(book_id = %id, "book deleted");

    Ok(Json(MessageResponse::new("Book deleted")))
}
