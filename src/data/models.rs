//! Data models
//!
//! Rust structs representing database rows.
//! All models use ULID for IDs and chrono for timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// User
// =============================================================================

/// A local user, created on the first successful login with a provider.
///
/// `(provider, provider_id)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    /// Provider slug ("github" or "google")
    pub provider: String,
    /// Identifier issued by the provider
    pub provider_id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields used to create a user; see [`crate::service::UserDirectory`].
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub provider: String,
    pub provider_id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

// =============================================================================
// Session
// =============================================================================

/// Server-side session row. Only the hash of the session id is stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRecord {
    pub id_hash: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Author {
    pub id: String,
    pub name: String,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Writable author fields, shared by create and full update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthorFields {
    pub name: String,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub country: Option<String>,
}

/// Book row as stored; `genres` is a JSON array.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookRow {
    pub id: String,
    pub title: String,
    pub author_id: String,
    pub price: f64,
    pub published_year: i64,
    pub genres: String,
    pub in_stock: bool,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Joined from `authors`; `None` if the author was deleted
    pub author_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub price: f64,
    pub published_year: i64,
    pub genres: Vec<String>,
    pub in_stock: bool,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        let genres = serde_json::from_str::<Vec<String>>(&row.genres).unwrap_or_else(|error| {
            tracing::warn!(book_id = %row.id, %error, "stored genres are not a JSON string array");
            Vec::new()
        });

        Self {
            id: row.id,
            title: row.title,
            author_id: row.author_id,
            author_name: row.author_name,
            price: row.price,
            published_year: row.published_year,
            genres,
            in_stock: row.in_stock,
            rating: row.rating,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Writable book fields, shared by create and full update.
#[derive(Debug, Clone, PartialEq)]
pub struct BookFields {
    pub title: String,
    pub author_id: String,
    pub price: f64,
    pub published_year: i64,
    pub genres: Vec<String>,
    pub in_stock: bool,
    pub rating: f64,
}
