//! Request validation and response shapes for the catalog API
//!
//! Bodies are validated field by field from raw JSON so every failure maps
//! to a specific 400 message. Response field names are camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::data::{Author, AuthorFields, Book, BookFields};
use crate::error::AppError;

const BOOK_REQUIRED: &str = "title, authorId, price, and publishedYear are required";

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorView {
    pub id: String,
    pub name: String,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Author> for AuthorView {
    fn from(author: Author) -> Self {
        Self {
            id: author.id,
            name: author.name,
            bio: author.bio,
            website: author.website,
            country: author.country,
            created_at: author.created_at,
            updated_at: author.updated_at,
        }
    }
}

/// The `{id, name}` of a book's author
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AuthorRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookView {
    pub id: String,
    pub title: String,
    pub author_id: String,
    /// `null` once the author has been deleted
    pub author: Option<AuthorRef>,
    pub price: f64,
    pub published_year: i64,
    pub genres: Vec<String>,
    pub in_stock: bool,
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Book> for BookView {
    fn from(book: Book) -> Self {
        let author = book.author_name.map(|name| AuthorRef {
            id: book.author_id.clone(),
            name,
        });

        Self {
            id: book.id,
            title: book.title,
            author_id: book.author_id,
            author,
            price: book.price,
            published_year: book.published_year,
            genres: book.genres,
            in_stock: book.in_stock,
            rating: book.rating,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// =============================================================================
// Request bodies
// =============================================================================

// These only describe the bodies in the API document. Handlers take raw JSON
// and run it through `parse_book` / `parse_author`.

/// Book body for POST and PUT
#[allow(dead_code)]
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookInput {
    #[schema(example = "Node.js for Beginners")]
    title: String,
    author_id: String,
    #[schema(example = 29.99)]
    price: f64,
    #[schema(example = 2023)]
    published_year: i64,
    /// Defaults to `[]`
    genres: Option<Vec<String>>,
    /// Defaults to `true`
    in_stock: Option<bool>,
    /// 0 to 5, defaults to 0
    rating: Option<f64>,
}

/// Author body for POST and PUT
#[allow(dead_code)]
#[derive(Deserialize, ToSchema)]
pub struct AuthorInput {
    #[schema(example = "Alice Johnson")]
    name: String,
    bio: Option<String>,
    website: Option<String>,
    country: Option<String>,
}

// =============================================================================
// Validation
// =============================================================================

fn as_object(body: &Value) -> Result<&Map<String, Value>, AppError> {
    body.as_object()
        .ok_or_else(|| AppError::Validation("request body must be a JSON object".to_string()))
}

/// Absent and `null` are the same thing.
fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).filter(|value| !value.is_null())
}

/// Values a client cannot use to fill a required text field: absent,
/// `null`, `false`, `0` and `""`.
fn is_falsy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => !b,
        Some(Value::Number(n)) => n.as_f64() == Some(0.0),
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => false,
    }
}

fn optional_string(
    object: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<String>, AppError> {
    match field(object, name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(AppError::Validation(format!("{name} must be a string"))),
    }
}

/// Validate a book body for POST or PUT.
///
/// Unknown keys (including `_id`) are ignored. Optional fields take their
/// defaults when absent.
pub fn parse_book(body: &Value) -> Result<BookFields, AppError> {
    let object = as_object(body)?;

    let title = object.get("title");
    let author_id = object.get("authorId");
    // Only a missing key counts as absent here; `null` fails the number check.
    let price = object.get("price");
    let published_year = object.get("publishedYear");

    if is_falsy(title) || is_falsy(author_id) || price.is_none() || published_year.is_none() {
        return Err(AppError::Validation(BOOK_REQUIRED.to_string()));
    }

    let (Some(Value::String(title)), Some(Value::String(author_id))) = (title, author_id) else {
        return Err(AppError::Validation(
            "title and authorId must be strings".to_string(),
        ));
    };

    let (Some(price), Some(published_year)) = (
        price.and_then(Value::as_f64),
        published_year.and_then(Value::as_f64),
    ) else {
        return Err(AppError::Validation(
            "price and publishedYear must be numbers".to_string(),
        ));
    };

    if published_year.fract() != 0.0 || published_year.abs() > i32::MAX as f64 {
        return Err(AppError::Validation(
            "publishedYear must be an integer".to_string(),
        ));
    }

    let genres = match field(object, "genres") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                AppError::Validation("genres must be an array of strings".to_string())
            })?,
        Some(_) => {
            return Err(AppError::Validation(
                "genres must be an array of strings".to_string(),
            ));
        }
    };

    let in_stock = match field(object, "inStock") {
        None => true,
        Some(Value::Bool(value)) => *value,
        Some(_) => return Err(AppError::Validation("inStock must be a boolean".to_string())),
    };

    let rating = match field(object, "rating") {
        None => 0.0,
        Some(value) => value
            .as_f64()
            .filter(|rating| (0.0..=5.0).contains(rating))
            .ok_or_else(|| AppError::Validation("rating must be between 0 and 5".to_string()))?,
    };

    Ok(BookFields {
        title: title.clone(),
        author_id: author_id.clone(),
        price,
        published_year: published_year as i64,
        genres,
        in_stock,
        rating,
    })
}

/// Validate an author body for POST or PUT.
pub fn parse_author(body: &Value) -> Result<AuthorFields, AppError> {
    let object = as_object(body)?;

    let name = object.get("name");
    if is_falsy(name) {
        return Err(AppError::Validation("name is required".to_string()));
    }
    let Some(Value::String(name)) = name else {
        return Err(AppError::Validation("name must be a string".to_string()));
    };

    Ok(AuthorFields {
        name: name.clone(),
        bio: optional_string(object, "bio")?,
        website: optional_string(object, "website")?,
        country: optional_string(object, "country")?,
    })
}
