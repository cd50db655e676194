//! `SQLite` storage implementation

use async_trait::async_trait;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::traits::*;
use crate::types::*;

/// Connection settings for [`SqliteCatalog`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteOptions {
    /// Database file
    pub path: PathBuf,
    /// How long a transaction waits for another writer before giving up
    pub busy_timeout: Duration,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./catalog.db"),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl SqliteOptions {
    /// Options for the database at `path`, with the default busy timeout
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => CatalogError::StoreConflict(err.to_string()),
            _ => CatalogError::StoreUnavailable(err.to_string()),
        }
    }
}

impl ToSql for EditionVersion {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for EditionVersion {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err: CatalogError| FromSqlError::Other(Box::new(err)))
    }
}

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get("id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn edition_from_row(row: &Row<'_>) -> rusqlite::Result<Edition> {
    Ok(Edition {
        id: row.get("id")?,
        book_id: row.get("book_id")?,
        version: row.get("version")?,
        title: row.get("title")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn alias_from_row(row: &Row<'_>) -> rusqlite::Result<Alias> {
    Ok(Alias {
        id: row.get("id")?,
        book_id: row.get("book_id")?,
        scheme: row.get("scheme")?,
        value: row.get("value")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn select_book(conn: &Connection, book_id: &str) -> CatalogResult<Option<Book>> {
    let book = conn
        .query_row(
            "SELECT id, created_at, updated_at FROM books WHERE id = ?1",
            [book_id],
            book_from_row,
        )
        .optional()?;
    Ok(book)
}

fn select_editions(conn: &Connection, book_id: Option<&str>) -> CatalogResult<Vec<Edition>> {
    let mut stmt = conn.prepare(
        r"
        SELECT id, book_id, version, title, description, created_at, updated_at
        FROM editions
        WHERE ?1 IS NULL OR book_id = ?1
        ",
    )?;
    let mut editions = stmt
        .query_map([book_id], edition_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    editions.sort_by(|a, b| {
        a.book_id
            .cmp(&b.book_id)
            .then_with(|| b.version.cmp(&a.version))
    });
    Ok(editions)
}

fn select_aliases(conn: &Connection, book_id: Option<&str>) -> CatalogResult<Vec<Alias>> {
    let mut stmt = conn.prepare(
        r"
        SELECT id, book_id, scheme, value, created_at, updated_at
        FROM aliases
        WHERE ?1 IS NULL OR book_id = ?1
        ORDER BY value
        ",
    )?;
    let aliases = stmt
        .query_map([book_id], alias_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(aliases)
}

/// Run connection work on tokio's blocking pool, so lock waits never stall
/// the executor.
async fn run_blocking<T, F>(work: F) -> CatalogResult<T>
where
    F: FnOnce() -> CatalogResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| CatalogError::StoreUnavailable(format!("SQLite worker failed: {err}")))?
}

/// `SQLite`-backed catalog store.
///
/// The schema enforces book ID, `(book, version)` and alias value
/// uniqueness. Each transaction runs on its own connection under
/// `BEGIN IMMEDIATE`, so writers are serialized by `SQLite` itself and a
/// writer that cannot get the lock within `busy_timeout` fails with
/// [`CatalogError::StoreUnavailable`].
///
/// Every statement runs on tokio's blocking pool, so the store must be used
/// from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    options: SqliteOptions,
}

impl SqliteCatalog {
    /// Open or create a catalog database.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or initialized.
    pub fn open(options: SqliteOptions) -> CatalogResult<Self> {
        let store = Self { options };
        let conn = store.connect()?;
        init_schema(&conn)?;
        tracing::debug!(path = %store.options.path.display(), "Opened SQLite catalog");
        Ok(store)
    }

    /// Connection settings this store was opened with
    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }

    fn connect(&self) -> CatalogResult<Connection> {
        let conn = Connection::open(&self.options.path)?;
        conn.busy_timeout(self.options.busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    async fn with_connection<T, F>(&self, work: F) -> CatalogResult<T>
    where
        F: FnOnce(&Connection) -> CatalogResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        run_blocking(move || work(&store.connect()?)).await
    }
}

fn init_schema(conn: &Connection) -> CatalogResult<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS books (
            id TEXT PRIMARY KEY NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS editions (
            id BLOB PRIMARY KEY NOT NULL,
            book_id TEXT NOT NULL REFERENCES books(id),
            version TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(book_id, version)
        );

        CREATE INDEX IF NOT EXISTS idx_editions_title ON editions(title);
        CREATE INDEX IF NOT EXISTS idx_editions_updated_at ON editions(updated_at);

        -- Alias values are unique regardless of scheme
        CREATE TABLE IF NOT EXISTS aliases (
            id BLOB PRIMARY KEY NOT NULL,
            book_id TEXT NOT NULL REFERENCES books(id),
            scheme TEXT NOT NULL,
            value TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_aliases_book_id ON aliases(book_id);
        ",
    )?;
    Ok(())
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    type Transaction = SqliteTransaction;

    async fn begin(&self) -> CatalogResult<SqliteTransaction> {
        let store = self.clone();
        let conn = run_blocking(move || {
            let conn = store.connect()?;
            conn.execute_batch("BEGIN IMMEDIATE")?;
            Ok(conn)
        })
        .await?;
        Ok(SqliteTransaction {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn get_book(&self, book_id: &str) -> CatalogResult<Option<Book>> {
        let book_id = book_id.to_string();
        self.with_connection(move |conn| select_book(conn, &book_id))
            .await
    }

    async fn list_books(&self) -> CatalogResult<Vec<Book>> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, created_at, updated_at FROM books ORDER BY id")?;
            let books = stmt
                .query_map([], book_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(books)
        })
        .await
    }

    async fn editions_for(&self, book_id: &str) -> CatalogResult<Vec<Edition>> {
        let book_id = book_id.to_string();
        self.with_connection(move |conn| select_editions(conn, Some(&book_id)))
            .await
    }

    async fn aliases_for(&self, book_id: &str) -> CatalogResult<Vec<Alias>> {
        let book_id = book_id.to_string();
        self.with_connection(move |conn| select_aliases(conn, Some(&book_id)))
            .await
    }

    async fn all_editions(&self) -> CatalogResult<Vec<Edition>> {
        self.with_connection(|conn| select_editions(conn, None))
            .await
    }

    async fn all_aliases(&self) -> CatalogResult<Vec<Alias>> {
        self.with_connection(|conn| select_aliases(conn, None))
            .await
    }
}

fn lock_connection(conn: &Mutex<Connection>) -> std::sync::MutexGuard<'_, Connection> {
    // A panic mid-statement leaves the connection itself usable.
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Transaction over a [`SqliteCatalog`]; rolled back when dropped uncommitted
#[derive(Debug)]
pub struct SqliteTransaction {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTransaction {
    async fn with_connection<T, F>(&self, work: F) -> CatalogResult<T>
    where
        F: FnOnce(&Connection) -> CatalogResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        run_blocking(move || work(&lock_connection(&conn))).await
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        let conn = lock_connection(&self.conn);
        if !conn.is_autocommit() {
            if let Err(err) = conn.execute_batch("ROLLBACK") {
                tracing::warn!(error = %err, "Failed to roll back SQLite transaction");
            }
        }
    }
}

fn select_matching_aliases(
    conn: &Connection,
    scheme: &str,
    value: &str,
) -> CatalogResult<Vec<Alias>> {
    let mut stmt = conn.prepare(
        r"
        SELECT id, book_id, scheme, value, created_at, updated_at
        FROM aliases
        WHERE scheme = ?1 AND value = ?2
        ",
    )?;
    let aliases = stmt
        .query_map([scheme, value], alias_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(aliases)
}

#[async_trait]
impl CatalogTransaction for SqliteTransaction {
    async fn find_book_by_id(&mut self, book_id: &str) -> CatalogResult<Option<Book>> {
        let book_id = book_id.to_string();
        self.with_connection(move |conn| select_book(conn, &book_id))
            .await
    }

    async fn find_aliases(&mut self, scheme: &str, value: &str) -> CatalogResult<Vec<Alias>> {
        let (scheme, value) = (scheme.to_string(), value.to_string());
        self.with_connection(move |conn| select_matching_aliases(conn, &scheme, &value))
            .await
    }

    async fn create_book(&mut self, book_id: &str) -> CatalogResult<Book> {
        let book = Book::new(book_id.to_string());
        let row = book.clone();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO books (id, created_at, updated_at) VALUES (?1, ?2, ?3)",
                (&row.id, row.created_at, row.updated_at),
            )?;
            Ok(())
        })
        .await?;
        tracing::debug!(book_id, "Created book");
        Ok(book)
    }

    async fn find_or_create_edition(
        &mut self,
        book_id: &str,
        version: &EditionVersion,
    ) -> CatalogResult<(Edition, bool)> {
        let candidate = Edition::new(book_id.to_string(), version.clone());
        let (edition, created) = self
            .with_connection(move |conn| {
                let existing = conn
                    .query_row(
                        r"
                        SELECT id, book_id, version, title, description, created_at, updated_at
                        FROM editions
                        WHERE book_id = ?1 AND version = ?2
                        ",
                        (&candidate.book_id, &candidate.version),
                        edition_from_row,
                    )
                    .optional()?;
                if let Some(edition) = existing {
                    return Ok((edition, false));
                }

                conn.execute(
                    r"
                    INSERT INTO editions (id, book_id, version, title, description, created_at, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ",
                    (
                        candidate.id,
                        &candidate.book_id,
                        &candidate.version,
                        &candidate.title,
                        &candidate.description,
                        candidate.created_at,
                        candidate.updated_at,
                    ),
                )?;
                Ok((candidate, true))
            })
            .await?;
        if created {
            tracing::debug!(book_id, %version, "Created edition");
        }
        Ok((edition, created))
    }

    async fn save_edition(&mut self, edition: &Edition) -> CatalogResult<()> {
        let edition = edition.clone();
        self.with_connection(move |conn| {
            let updated = conn.execute(
                r"
                UPDATE editions
                SET title = ?3, description = ?4, updated_at = ?5
                WHERE book_id = ?1 AND version = ?2
                ",
                (
                    &edition.book_id,
                    &edition.version,
                    &edition.title,
                    &edition.description,
                    edition.updated_at,
                ),
            )?;
            if updated == 0 {
                return Err(CatalogError::StoreConflict(format!(
                    "edition {} of book '{}' does not exist",
                    edition.version, edition.book_id
                )));
            }
            Ok(())
        })
        .await
    }

    async fn find_or_create_alias(
        &mut self,
        book_id: &str,
        scheme: &str,
        value: &str,
    ) -> CatalogResult<(Alias, bool)> {
        if let Some(alias) = self.find_aliases(scheme, value).await?.pop() {
            if alias.book_id != book_id {
                tracing::debug!(
                    book_id,
                    owner = %alias.book_id,
                    scheme,
                    value,
                    "Alias already belongs to another book, leaving it there"
                );
            }
            return Ok((alias, false));
        }

        let alias = Alias::new(book_id.to_string(), scheme.to_string(), value.to_string());
        let row = alias.clone();
        self.with_connection(move |conn| {
            conn.execute(
                r"
                INSERT INTO aliases (id, book_id, scheme, value, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
                (
                    row.id,
                    &row.book_id,
                    &row.scheme,
                    &row.value,
                    row.created_at,
                    row.updated_at,
                ),
            )?;
            Ok(())
        })
        .await?;
        tracing::debug!(book_id, scheme, value, "Created alias");
        Ok((alias, true))
    }

    async fn commit(self) -> CatalogResult<()> {
        self.with_connection(|conn| {
            conn.execute_batch("COMMIT")?;
            Ok(())
        })
        .await?;
        tracing::debug!("SQLite catalog commit applied");
        Ok(())
    }
}
