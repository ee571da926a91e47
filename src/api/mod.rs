//! API layer
//!
//! HTTP handlers for:
//! - Books and authors (reads public, writes behind the auth gate)
//! - API documentation (OpenAPI + Swagger UI)

pub(crate) mod authors;
pub(crate) mod books;
mod docs;
mod dto;

pub use dto::*;

pub use authors::authors_router;
pub use books::books_router;
pub use docs::{docs_router, openapi_document};

use axum::Router;

use crate::AppState;

/// Catalog and documentation routes
pub fn api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(docs_router(&state.providers))
        .merge(books_router(state.clone()))
        .merge(authors_router(state))
}
