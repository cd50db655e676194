//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::record::BookRecord;
use crate::types::*;

/// Storage abstraction for the catalog
///
/// This trait allows the catalog to work with any storage backend
/// (SQLite, PostgreSQL, in-memory, etc.). Writes only happen through a
/// [`CatalogTransaction`]; the remaining methods are plain reads used for
/// browsing.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Unit of work handed out by [`CatalogStore::begin`]
    type Transaction: CatalogTransaction;

    /// Open a new transaction. Every read and write made through it shares
    /// one atomic boundary.
    async fn begin(&self) -> CatalogResult<Self::Transaction>;

    /// Get a book by ID
    async fn get_book(&self, book_id: &str) -> CatalogResult<Option<Book>>;

    /// List all books, ordered by ID
    async fn list_books(&self) -> CatalogResult<Vec<Book>>;

    /// List the editions of a book, newest version first
    async fn editions_for(&self, book_id: &str) -> CatalogResult<Vec<Edition>>;

    /// List the aliases of a book
    async fn aliases_for(&self, book_id: &str) -> CatalogResult<Vec<Alias>>;

    /// List every edition in the store
    async fn all_editions(&self) -> CatalogResult<Vec<Edition>>;

    /// List every alias in the store
    async fn all_aliases(&self) -> CatalogResult<Vec<Alias>>;
}

/// Lookup and write primitives over books, editions and aliases, scoped to
/// one transaction.
///
/// Nothing written through a transaction is visible to other transactions
/// until [`CatalogTransaction::commit`] succeeds. Dropping a transaction
/// without committing discards its writes.
#[async_trait]
pub trait CatalogTransaction: Send {
    /// Find a book by its primary identifier
    async fn find_book_by_id(&mut self, book_id: &str) -> CatalogResult<Option<Book>>;

    /// Find every alias with exactly this scheme and value
    async fn find_aliases(&mut self, scheme: &str, value: &str) -> CatalogResult<Vec<Alias>>;

    /// Create a book. Fails with [`CatalogError::StoreConflict`] if the ID is taken.
    async fn create_book(&mut self, book_id: &str) -> CatalogResult<Book>;

    /// Find the edition for `(book_id, version)`, creating an untitled one if
    /// it does not exist. The flag is `true` when the edition was created.
    async fn find_or_create_edition(
        &mut self,
        book_id: &str,
        version: &EditionVersion,
    ) -> CatalogResult<(Edition, bool)>;

    /// Persist the content of an edition
    async fn save_edition(&mut self, edition: &Edition) -> CatalogResult<()>;

    /// Find the alias with this scheme and value, creating it for `book_id`
    /// if it does not exist. An existing alias is returned untouched. The flag
    /// is `true` when the alias was created.
    async fn find_or_create_alias(
        &mut self,
        book_id: &str,
        scheme: &str,
        value: &str,
    ) -> CatalogResult<(Alias, bool)>;

    /// Make every write of this transaction visible atomically
    async fn commit(self) -> CatalogResult<()>;
}

/// Trait for implementing custom record validation rules
pub trait RecordValidator: Send + Sync {
    /// Validate an incoming record before it touches the store
    fn validate_record(&self, record: &BookRecord) -> CatalogResult<()>;
}

/// Default record validator with the rules every edition and alias needs
pub struct DefaultRecordValidator;

impl RecordValidator for DefaultRecordValidator {
    fn validate_record(&self, record: &BookRecord) -> CatalogResult<()> {
        if record.title.trim().is_empty() {
            return Err(CatalogError::Validation(
                "Edition title cannot be empty".to_string(),
            ));
        }

        for alias in &record.aliases {
            if alias.scheme.trim().is_empty() || alias.value.trim().is_empty() {
                return Err(CatalogError::Validation(
                    "Alias scheme and value cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// One row of the book listing: what a browsing surface shows per book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSummary {
    pub id: String,
    /// Title of the latest edition, if the book has any
    pub title: Option<String>,
    pub number_of_editions: usize,
}

/// Result of checking the catalog's uniqueness and reference invariants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogIntegrityReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub books: usize,
    pub editions: usize,
    pub aliases: usize,
}
