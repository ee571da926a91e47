//! SQLite database operations
//!
//! All database access goes through this module.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;

use super::models::*;
use crate::error::AppError;

const USER_COLUMNS: &str = "id, provider, provider_id, username, display_name, email, avatar_url, created_at, updated_at";

const BOOK_SELECT: &str = r#"
    SELECT b.id, b.title, b.author_id, b.price, b.published_year, b.genres,
           b.in_stock, b.rating, b.created_at, b.updated_at,
           a.name AS author_name
    FROM books b
    LEFT JOIN authors a ON a.id = b.author_id
"#;

fn encode_genres(genres: &[String]) -> Result<String, AppError> {
    serde_json::to_string(genres).map_err(|e| AppError::Internal(e.into()))
}

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!(path = %path.display(), "Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Get user by external identity
    pub async fn get_user_by_identity(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<User>, AppError> {
        let query =
            format!("SELECT {USER_COLUMNS} FROM users WHERE provider = ? AND provider_id = ?");
        let user = sqlx::query_as::<_, User>(&query)
            .bind(provider)
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Insert a user unless one already exists for the same identity.
    ///
    /// Atomic at the statement level: the unique index on
    /// `(provider, provider_id)` makes concurrent first logins collapse
    /// onto a single row.
    ///
    /// # Returns
    /// `true` if a row was inserted.
    pub async fn insert_user_if_absent(&self, user: &NewUser) -> Result<bool, AppError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (
                id, provider, provider_id, username, display_name, email, avatar_url,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (provider, provider_id) DO NOTHING
            "#,
        )
        .bind(EntityId::new().0)
        .bind(&user.provider)
        .bind(&user.provider_id)
        .bind(&user.username)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(&user.avatar_url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Count users, optionally for one provider
    pub async fn count_users(&self, provider: Option<&str>) -> Result<i64, AppError> {
        let count = match provider {
            Some(provider) => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE provider = ?")
                    .bind(provider)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        Ok(count)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Insert a new session
    pub async fn insert_session(&self, session: &SessionRecord) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO sessions (id_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.id_hash)
        .bind(&session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the user bound to an unexpired session
    ///
    /// # Returns
    /// `None` if the session is unknown, expired, or its user no longer exists
    pub async fn get_session_user(
        &self,
        id_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.provider, u.provider_id, u.username, u.display_name, u.email,
                   u.avatar_url, u.created_at, u.updated_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.id_hash = ? AND s.expires_at > ?
            "#,
        )
        .bind(id_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Delete session by hash
    ///
    /// # Returns
    /// `true` if a session was removed
    pub async fn delete_session(&self, id_hash: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id_hash = ?")
            .bind(id_hash)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every session that expired before `now`
    pub async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Authors
    // =========================================================================

    pub async fn list_authors(&self) -> Result<Vec<Author>, AppError> {
        let authors =
            sqlx::query_as::<_, Author>("SELECT * FROM authors ORDER BY created_at, id")
                .fetch_all(&self.pool)
                .await?;

        Ok(authors)
    }

    pub async fn get_author(&self, id: &str) -> Result<Option<Author>, AppError> {
        let author = sqlx::query_as::<_, Author>("SELECT * FROM authors WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(author)
    }

    pub async fn author_exists(&self, id: &str) -> Result<bool, AppError> {
        let exists =
            sqlx::query_scalar::<_, i64>("SELECT EXISTS(SELECT 1 FROM authors WHERE id = ?)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists == 1)
    }

    pub async fn insert_author(&self, fields: &AuthorFields) -> Result<Author, AppError> {
        let now = Utc::now();
        let author = Author {
            id: EntityId::new().0,
            name: fields.name.clone(),
            bio: fields.bio.clone(),
            website: fields.website.clone(),
            country: fields.country.clone(),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO authors (id, name, bio, website, country, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&author.id)
        .bind(&author.name)
        .bind(&author.bio)
        .bind(&author.website)
        .bind(&author.country)
        .bind(author.created_at)
        .bind(author.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(author)
    }

    /// Replace an author's writable fields
    ///
    /// # Returns
    /// The updated author, or `None` if no author has this ID
    pub async fn update_author(
        &self,
        id: &str,
        fields: &AuthorFields,
    ) -> Result<Option<Author>, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE authors
            SET name = ?, bio = ?, website = ?, country = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&fields.name)
        .bind(&fields.bio)
        .bind(&fields.website)
        .bind(&fields.country)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_author(id).await
    }

    /// Delete author by ID
    ///
    /// Books keep their `author_id`; their embedded author becomes `null`.
    pub async fn delete_author(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM authors WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Books
    // =========================================================================

    pub async fn list_books(&self) -> Result<Vec<Book>, AppError> {
        let query = format!("{BOOK_SELECT} ORDER BY b.created_at, b.id");
        let rows = sqlx::query_as::<_, BookRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Book::from).collect())
    }

    pub async fn get_book(&self, id: &str) -> Result<Option<Book>, AppError> {
        let query = format!("{BOOK_SELECT} WHERE b.id = ?");
        let row = sqlx::query_as::<_, BookRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Book::from))
    }

    pub async fn insert_book(&self, fields: &BookFields) -> Result<Book, AppError> {
        let id = EntityId::new().0;
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO books (
                id, title, author_id, price, published_year, genres, in_stock, rating,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&fields.title)
        .bind(&fields.author_id)
        .bind(fields.price)
        .bind(fields.published_year)
        .bind(encode_genres(&fields.genres)?)
        .bind(fields.in_stock)
        .bind(fields.rating)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_book(&id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("inserted book {id} not readable")))
    }

    /// Replace a book's writable fields
    ///
    /// # Returns
    /// The updated book, or `None` if no book has this ID
    pub async fn update_book(
        &self,
        id: &str,
        fields: &BookFields,
    ) -> Result<Option<Book>, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = ?, author_id = ?, price = ?, published_year = ?, genres = ?,
                in_stock = ?, rating = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&fields.title)
        .bind(&fields.author_id)
        .bind(fields.price)
        .bind(fields.published_year)
        .bind(encode_genres(&fields.genres)?)
        .bind(fields.in_stock)
        .bind(fields.rating)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_book(id).await
    }

    /// Delete book by ID
    pub async fn delete_book(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
