//! Main catalog facade that coordinates reconciliation and browsing

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::catalog::record::BookRecord;
use crate::reconciliation::{Reconciler, ReconcilerOptions};
use crate::traits::*;
use crate::types::*;

/// Book catalog over a storage backend
pub struct Catalog<S: CatalogStore> {
    reconciler: Reconciler<S>,
}

impl<S: CatalogStore> Catalog<S> {
    /// Create a new catalog with the given storage backend
    pub fn new(store: S) -> Self {
        Self {
            reconciler: Reconciler::new(store),
        }
    }

    /// Create a new catalog with a custom record validator
    pub fn with_validator(store: S, validator: Box<dyn RecordValidator>) -> Self {
        Self {
            reconciler: Reconciler::with_validator(store, validator),
        }
    }

    /// Replace the reconciliation options
    pub fn with_options(mut self, options: ReconcilerOptions) -> Self {
        self.reconciler = self.reconciler.with_options(options);
        self
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        self.reconciler.store()
    }

    // Reconciliation
    /// Merge one record into the catalog, returning its book ID
    pub async fn reconcile(&self, record: &BookRecord) -> CatalogResult<String> {
        self.reconciler.reconcile(record).await
    }

    /// Merge one record, retrying from scratch on store conflicts
    pub async fn reconcile_with_retry(&self, record: &BookRecord) -> CatalogResult<String> {
        self.reconciler.reconcile_with_retry(record).await
    }

    // Browsing
    /// Get a book by ID
    pub async fn get_book(&self, book_id: &str) -> CatalogResult<Option<Book>> {
        self.store().get_book(book_id).await
    }

    /// Get a book by ID, returning an error if not found
    pub async fn get_book_required(&self, book_id: &str) -> CatalogResult<Book> {
        self.get_book(book_id)
            .await?
            .ok_or_else(|| CatalogError::BookNotFound(book_id.to_string()))
    }

    /// List all books
    pub async fn list_books(&self) -> CatalogResult<Vec<Book>> {
        self.store().list_books().await
    }

    /// Editions of a book, newest version first
    pub async fn editions(&self, book_id: &str) -> CatalogResult<Vec<Edition>> {
        self.get_book_required(book_id).await?;
        self.store().editions_for(book_id).await
    }

    /// The highest-version edition of a book
    pub async fn latest_edition(&self, book_id: &str) -> CatalogResult<Option<Edition>> {
        Ok(self.editions(book_id).await?.into_iter().next())
    }

    /// Aliases of a book
    pub async fn aliases(&self, book_id: &str) -> CatalogResult<Vec<Alias>> {
        self.get_book_required(book_id).await?;
        self.store().aliases_for(book_id).await
    }

    /// One summary row per book, titled after its latest edition
    pub async fn book_summaries(&self) -> CatalogResult<Vec<BookSummary>> {
        let books = self.list_books().await?;
        let mut summaries = Vec::with_capacity(books.len());

        for book in books {
            let editions = self.store().editions_for(&book.id).await?;
            summaries.push(BookSummary {
                title: editions.first().map(|edition| edition.title.clone()),
                number_of_editions: editions.len(),
                id: book.id,
            });
        }

        Ok(summaries)
    }

    /// Check the uniqueness and reference invariants of the whole catalog
    pub async fn check_integrity(&self) -> CatalogResult<CatalogIntegrityReport> {
        let books = self.list_books().await?;
        let editions = self.store().all_editions().await?;
        let aliases = self.store().all_aliases().await?;

        let book_ids: HashSet<&str> = books.iter().map(|book| book.id.as_str()).collect();
        let mut issues = Vec::new();

        let mut seen_versions = HashSet::new();
        for edition in &editions {
            if !book_ids.contains(edition.book_id.as_str()) {
                issues.push(format!(
                    "Edition {} references missing book '{}'",
                    edition.id, edition.book_id
                ));
            }
            if !seen_versions.insert((edition.book_id.as_str(), &edition.version)) {
                issues.push(format!(
                    "Book '{}' has more than one edition {}",
                    edition.book_id, edition.version
                ));
            }
            if edition.title.trim().is_empty() {
                issues.push(format!(
                    "Edition {} of book '{}' has no title",
                    edition.version, edition.book_id
                ));
            }
        }

        let mut owners: HashMap<&str, BTreeSet<&str>> = HashMap::new();
        for alias in &aliases {
            if !book_ids.contains(alias.book_id.as_str()) {
                issues.push(format!(
                    "Alias '{}' references missing book '{}'",
                    alias.value, alias.book_id
                ));
            }
            owners
                .entry(alias.value.as_str())
                .or_default()
                .insert(alias.book_id.as_str());
        }
        for (value, owning) in owners {
            if owning.len() > 1 {
                issues.push(format!(
                    "Alias '{value}' belongs to more than one book: {}",
                    owning.into_iter().collect::<Vec<_>>().join(", ")
                ));
            }
        }

        Ok(CatalogIntegrityReport {
            is_valid: issues.is_empty(),
            issues,
            books: books.len(),
            editions: editions.len(),
            aliases: aliases.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::memory_storage::MemoryCatalog;

    #[tokio::test]
    async fn test_catalog_basic_operations() {
        let catalog = Catalog::new(MemoryCatalog::new());

        let first = BookRecord::builder()
            .id("A")
            .alias("isbn10", "0596520689")
            .version("1.0")
            .title("First Edition")
            .build();
        let second = BookRecord::builder()
            .id("A")
            .version("2.0")
            .title("Second Edition")
            .description("Revised")
            .build();

        catalog.reconcile(&first).await.unwrap();
        catalog.reconcile(&second).await.unwrap();

        let latest = catalog.latest_edition("A").await.unwrap().unwrap();
        assert_eq!(latest.title, "Second Edition");
        assert_eq!(latest.description.as_deref(), Some("Revised"));
        assert_eq!(catalog.aliases("A").await.unwrap().len(), 1);

        let summaries = catalog.book_summaries().await.unwrap();
        assert_eq!(
            summaries,
            vec![BookSummary {
                id: "A".to_string(),
                title: Some("Second Edition".to_string()),
                number_of_editions: 2,
            }]
        );

        let report = catalog.check_integrity().await.unwrap();
        assert!(report.is_valid, "{:?}", report.issues);
        assert_eq!((report.books, report.editions, report.aliases), (1, 2, 1));
    }

    #[tokio::test]
    async fn test_unknown_book() {
        let catalog = Catalog::new(MemoryCatalog::new());

        assert!(catalog.get_book("missing").await.unwrap().is_none());
        assert_eq!(
            catalog.editions("missing").await,
            Err(CatalogError::BookNotFound("missing".to_string()))
        );
        assert!(matches!(
            catalog.aliases("missing").await,
            Err(CatalogError::BookNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_summary_without_editions() {
        let store = MemoryCatalog::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_book("bare").await.unwrap();
        tx.commit().await.unwrap();

        let catalog = Catalog::new(store);
        let summaries = catalog.book_summaries().await.unwrap();
        assert_eq!(summaries[0].title, None);
        assert_eq!(summaries[0].number_of_editions, 0);
    }
}
