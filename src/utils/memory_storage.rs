//! In-memory storage implementation for testing

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::traits::*;
use crate::types::*;

type EditionKey = (String, EditionVersion);

/// Everything the catalog holds. Aliases are keyed by value, which is
/// unique across schemes.
#[derive(Debug, Clone, Default)]
struct CatalogState {
    books: BTreeMap<String, Book>,
    editions: BTreeMap<EditionKey, Edition>,
    aliases: BTreeMap<String, Alias>,
}

/// A write made inside a transaction, replayed against the shared state on
/// commit.
#[derive(Debug, Clone)]
enum Write {
    CreateBook(Book),
    CreateEdition(Edition),
    SaveEdition(Edition),
    CreateAlias(Alias),
}

fn edition_key(edition: &Edition) -> EditionKey {
    (edition.book_id.clone(), edition.version.clone())
}

impl CatalogState {
    /// Apply one write, enforcing the catalog's uniqueness and reference
    /// constraints.
    fn apply(&mut self, write: &Write) -> CatalogResult<()> {
        match write {
            Write::CreateBook(book) => {
                if self.books.contains_key(&book.id) {
                    return Err(CatalogError::StoreConflict(format!(
                        "book '{}' already exists",
                        book.id
                    )));
                }
                self.books.insert(book.id.clone(), book.clone());
            }
            Write::CreateEdition(edition) => {
                self.require_book(&edition.book_id)?;
                let key = edition_key(edition);
                if self.editions.contains_key(&key) {
                    return Err(CatalogError::StoreConflict(format!(
                        "edition {} of book '{}' already exists",
                        edition.version, edition.book_id
                    )));
                }
                self.editions.insert(key, edition.clone());
            }
            Write::SaveEdition(edition) => match self.editions.get_mut(&edition_key(edition)) {
                Some(existing) => {
                    existing.title = edition.title.clone();
                    existing.description = edition.description.clone();
                    existing.updated_at = edition.updated_at;
                }
                None => {
                    return Err(CatalogError::StoreConflict(format!(
                        "edition {} of book '{}' does not exist",
                        edition.version, edition.book_id
                    )));
                }
            },
            Write::CreateAlias(alias) => {
                self.require_book(&alias.book_id)?;
                if let Some(existing) = self.aliases.get(&alias.value) {
                    return Err(CatalogError::StoreConflict(format!(
                        "alias value '{}' already belongs to book '{}'",
                        alias.value, existing.book_id
                    )));
                }
                self.aliases.insert(alias.value.clone(), alias.clone());
            }
        }
        Ok(())
    }

    fn require_book(&self, book_id: &str) -> CatalogResult<()> {
        if self.books.contains_key(book_id) {
            Ok(())
        } else {
            Err(CatalogError::StoreConflict(format!(
                "book '{book_id}' does not exist"
            )))
        }
    }

    fn editions_for(&self, book_id: &str) -> Vec<Edition> {
        // Keys sort by version ascending within a book.
        self.editions
            .values()
            .filter(|edition| edition.book_id == book_id)
            .rev()
            .cloned()
            .collect()
    }
}

/// In-memory storage implementation for testing and development
///
/// Transactions read from a private snapshot and keep a log of their writes.
/// Commit replays the log against the current shared state, so a write that
/// collides with something committed in the meantime fails with
/// [`CatalogError::StoreConflict`] and nothing from that transaction is
/// applied.
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl MemoryCatalog {
    /// Create a new memory catalog instance
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(CatalogState::default())),
        }
    }

    /// Clear all data (useful for testing)
    pub fn clear(&self) -> CatalogResult<()> {
        *write_state(&self.state)? = CatalogState::default();
        Ok(())
    }

    fn read(&self) -> CatalogResult<RwLockReadGuard<'_, CatalogState>> {
        self.state
            .read()
            .map_err(|_| CatalogError::StoreUnavailable("memory catalog lock poisoned".to_string()))
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn write_state(
    state: &Arc<RwLock<CatalogState>>,
) -> CatalogResult<RwLockWriteGuard<'_, CatalogState>> {
    state
        .write()
        .map_err(|_| CatalogError::StoreUnavailable("memory catalog lock poisoned".to_string()))
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> CatalogResult<MemoryTransaction> {
        let snapshot = self.read()?.clone();
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.state),
            working: snapshot,
            writes: Vec::new(),
        })
    }

    async fn get_book(&self, book_id: &str) -> CatalogResult<Option<Book>> {
        Ok(self.read()?.books.get(book_id).cloned())
    }

    async fn list_books(&self) -> CatalogResult<Vec<Book>> {
        Ok(self.read()?.books.values().cloned().collect())
    }

    async fn editions_for(&self, book_id: &str) -> CatalogResult<Vec<Edition>> {
        Ok(self.read()?.editions_for(book_id))
    }

    async fn aliases_for(&self, book_id: &str) -> CatalogResult<Vec<Alias>> {
        Ok(self
            .read()?
            .aliases
            .values()
            .filter(|alias| alias.book_id == book_id)
            .cloned()
            .collect())
    }

    async fn all_editions(&self) -> CatalogResult<Vec<Edition>> {
        Ok(self.read()?.editions.values().cloned().collect())
    }

    async fn all_aliases(&self) -> CatalogResult<Vec<Alias>> {
        Ok(self.read()?.aliases.values().cloned().collect())
    }
}

/// Transaction over a [`MemoryCatalog`]
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<RwLock<CatalogState>>,
    working: CatalogState,
    writes: Vec<Write>,
}

impl MemoryTransaction {
    fn record(&mut self, write: Write) -> CatalogResult<()> {
        self.working.apply(&write)?;
        self.writes.push(write);
        Ok(())
    }
}

#[async_trait]
impl CatalogTransaction for MemoryTransaction {
    async fn find_book_by_id(&mut self, book_id: &str) -> CatalogResult<Option<Book>> {
        Ok(self.working.books.get(book_id).cloned())
    }

    async fn find_aliases(&mut self, scheme: &str, value: &str) -> CatalogResult<Vec<Alias>> {
        Ok(self
            .working
            .aliases
            .get(value)
            .filter(|alias| alias.matches(scheme, value))
            .cloned()
            .into_iter()
            .collect())
    }

    async fn create_book(&mut self, book_id: &str) -> CatalogResult<Book> {
        let book = Book::new(book_id.to_string());
        self.record(Write::CreateBook(book.clone()))?;
        Ok(book)
    }

    async fn find_or_create_edition(
        &mut self,
        book_id: &str,
        version: &EditionVersion,
    ) -> CatalogResult<(Edition, bool)> {
        let key = (book_id.to_string(), version.clone());
        if let Some(edition) = self.working.editions.get(&key) {
            return Ok((edition.clone(), false));
        }

        let edition = Edition::new(book_id.to_string(), version.clone());
        self.record(Write::CreateEdition(edition.clone()))?;
        Ok((edition, true))
    }

    async fn save_edition(&mut self, edition: &Edition) -> CatalogResult<()> {
        self.record(Write::SaveEdition(edition.clone()))
    }

    async fn find_or_create_alias(
        &mut self,
        book_id: &str,
        scheme: &str,
        value: &str,
    ) -> CatalogResult<(Alias, bool)> {
        if let Some(alias) = self.working.aliases.get(value) {
            if alias.scheme == scheme {
                if alias.book_id != book_id {
                    tracing::debug!(
                        book_id,
                        owner = %alias.book_id,
                        scheme,
                        value,
                        "Alias already belongs to another book, leaving it there"
                    );
                }
                return Ok((alias.clone(), false));
            }
        }

        let alias = Alias::new(book_id.to_string(), scheme.to_string(), value.to_string());
        self.record(Write::CreateAlias(alias.clone()))?;
        Ok((alias, true))
    }

    async fn commit(self) -> CatalogResult<()> {
        if self.writes.is_empty() {
            return Ok(());
        }

        let mut shared = write_state(&self.shared)?;
        let mut next = shared.clone();
        for write in &self.writes {
            if let Err(err) = next.apply(write) {
                tracing::debug!(error = %err, "Memory catalog commit rejected");
                return Err(err);
            }
        }
        *shared = next;

        tracing::debug!(writes = self.writes.len(), "Memory catalog commit applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(raw: &str) -> EditionVersion {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = MemoryCatalog::new();

        let mut tx = store.begin().await.unwrap();
        tx.create_book("A").await.unwrap();
        assert!(tx.find_book_by_id("A").await.unwrap().is_some());
        assert!(store.get_book("A").await.unwrap().is_none());

        tx.commit().await.unwrap();
        assert!(store.get_book("A").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_book_in_transaction() {
        let store = MemoryCatalog::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_book("A").await.unwrap();

        assert!(matches!(
            tx.create_book("A").await,
            Err(CatalogError::StoreConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_book_creation_conflicts() {
        let store = MemoryCatalog::new();
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        first.create_book("A").await.unwrap();
        second.create_book("A").await.unwrap();

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(CatalogError::StoreConflict(_))
        ));
        assert_eq!(store.list_books().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        let store = MemoryCatalog::new();
        let mut seed = store.begin().await.unwrap();
        seed.create_book("A").await.unwrap();
        seed.commit().await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        first.find_or_create_alias("A", "isbn10", "X").await.unwrap();
        second.create_book("B").await.unwrap();
        second.find_or_create_alias("B", "isbn10", "X").await.unwrap();

        first.commit().await.unwrap();
        assert!(second.commit().await.is_err());
        assert!(store.get_book("B").await.unwrap().is_none());
        assert_eq!(store.aliases_for("A").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edition_find_or_create_and_save() {
        let store = MemoryCatalog::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_book("A").await.unwrap();

        let (mut edition, created) = tx.find_or_create_edition("A", &version("1.0")).await.unwrap();
        assert!(created);
        edition.set_content("First".to_string(), None);
        tx.save_edition(&edition).await.unwrap();

        let (again, created) = tx.find_or_create_edition("A", &version("1")).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, edition.id);
        assert_eq!(again.title, "First");
        tx.commit().await.unwrap();

        assert_eq!(store.editions_for("A").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_editions_newest_first() {
        let store = MemoryCatalog::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_book("A").await.unwrap();
        for raw in ["1.0", "10.0", "2.1"] {
            tx.find_or_create_edition("A", &version(raw)).await.unwrap();
        }
        tx.commit().await.unwrap();

        let versions: Vec<String> = store
            .editions_for("A")
            .await
            .unwrap()
            .iter()
            .map(|e| e.version.to_string())
            .collect();
        assert_eq!(versions, vec!["10.0", "2.1", "1.0"]);
    }

    #[tokio::test]
    async fn test_alias_value_unique_across_schemes() {
        let store = MemoryCatalog::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_book("A").await.unwrap();
        tx.create_book("B").await.unwrap();

        let (_, created) = tx.find_or_create_alias("A", "isbn10", "X").await.unwrap();
        assert!(created);

        let (existing, created) = tx.find_or_create_alias("B", "isbn10", "X").await.unwrap();
        assert!(!created);
        assert_eq!(existing.book_id, "A");

        assert!(matches!(
            tx.find_or_create_alias("B", "isbn13", "X").await,
            Err(CatalogError::StoreConflict(_))
        ));
        assert!(tx.find_aliases("isbn13", "X").await.unwrap().is_empty());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_alias_owned_by_other_book_is_logged() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let store = MemoryCatalog::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_book("A").await.unwrap();
        tx.create_book("B").await.unwrap();
        tx.find_or_create_alias("A", "isbn10", "X").await.unwrap();

        let (alias, created) = tx.find_or_create_alias("B", "isbn10", "X").await.unwrap();
        assert!(!created);
        assert_eq!(alias.book_id, "A");

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("Alias already belongs to another book"), "{output}");
        assert!(output.contains("owner=A"), "{output}");
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryCatalog::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_book("A").await.unwrap();
        tx.commit().await.unwrap();

        store.clear().unwrap();
        assert!(store.list_books().await.unwrap().is_empty());
    }
}
