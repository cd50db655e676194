//! Reconciliation of incoming book records against the catalog
//!
//! A record names its book three ways at once: a declared identifier, a set
//! of aliases, and implicitly the edition it describes. The [`Reconciler`]
//! decides which existing book (if any) the record belongs to, rejects
//! records whose aliases disagree, and merges the edition and aliases into
//! the catalog inside a single transaction.

use serde::{Deserialize, Serialize};

use crate::catalog::record::BookRecord;
use crate::traits::*;
use crate::types::*;

/// Tuning for [`Reconciler::reconcile_with_retry`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerOptions {
    /// Total attempts made for a record that keeps hitting store conflicts
    pub max_attempts: u32,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Maps incoming records onto existing or new books
pub struct Reconciler<S: CatalogStore> {
    store: S,
    validator: Box<dyn RecordValidator>,
    options: ReconcilerOptions,
}

impl<S: CatalogStore> Reconciler<S> {
    /// Create a new reconciler over the given store
    pub fn new(store: S) -> Self {
        Self::with_validator(store, Box::new(DefaultRecordValidator))
    }

    /// Create a new reconciler with a custom record validator
    pub fn with_validator(store: S, validator: Box<dyn RecordValidator>) -> Self {
        Self {
            store,
            validator,
            options: ReconcilerOptions::default(),
        }
    }

    /// Replace the retry options
    pub fn with_options(mut self, options: ReconcilerOptions) -> Self {
        self.options = options;
        self
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The retry options in effect
    pub fn options(&self) -> &ReconcilerOptions {
        &self.options
    }

    /// Reconcile one record in its own transaction and return the ID of the
    /// book it was merged into.
    ///
    /// Either the whole merge is committed or nothing is written.
    pub async fn reconcile(&self, record: &BookRecord) -> CatalogResult<String> {
        let mut tx = self.store.begin().await?;
        let book_id = self.reconcile_in(&mut tx, record).await?;
        tx.commit().await?;
        Ok(book_id)
    }

    /// Reconcile one record, running it again from scratch while the store
    /// reports conflicts, up to [`ReconcilerOptions::max_attempts`] attempts.
    pub async fn reconcile_with_retry(&self, record: &BookRecord) -> CatalogResult<String> {
        let mut attempt = 1;
        loop {
            match self.reconcile(record).await {
                Err(err) if err.is_retryable() && attempt < self.options.max_attempts => {
                    tracing::warn!(attempt, error = %err, "Reconciliation conflicted, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Reconcile one record inside a transaction owned by the caller.
    ///
    /// The caller decides whether to commit; on error the transaction must be
    /// dropped.
    pub async fn reconcile_in<T: CatalogTransaction>(
        &self,
        tx: &mut T,
        record: &BookRecord,
    ) -> CatalogResult<String> {
        let version = record.parse_version()?;
        self.validator.validate_record(record)?;

        let book_id = resolve_book(tx, record).await?;

        let (mut edition, _) = tx.find_or_create_edition(&book_id, &version).await?;
        edition.set_content(record.title.clone(), record.description.clone());
        tx.save_edition(&edition).await?;

        for alias in &record.aliases {
            tx.find_or_create_alias(&book_id, &alias.scheme, &alias.value)
                .await?;
        }

        Ok(book_id)
    }
}

/// Pick the book a record belongs to, creating it if nothing matches.
///
/// A direct ID match wins outright. Otherwise all aliases must agree on a
/// single book. The ID match is not checked against the alias matches.
async fn resolve_book<T: CatalogTransaction>(
    tx: &mut T,
    record: &BookRecord,
) -> CatalogResult<String> {
    let declared_id = record.declared_id();
    let book_by_id = match declared_id {
        Some(id) => tx.find_book_by_id(id).await?,
        None => None,
    };

    let mut matched: Vec<String> = Vec::new();
    for alias in &record.aliases {
        for existing in tx.find_aliases(&alias.scheme, &alias.value).await? {
            if !matched.contains(&existing.book_id) {
                matched.push(existing.book_id);
            }
            if matched.len() > 1 {
                return Err(CatalogError::AmbiguousAliasMatch { books: matched });
            }
        }
    }

    match (book_by_id, matched.pop()) {
        (Some(book), _) => Ok(book.id),
        (None, Some(book_id)) => Ok(book_id),
        (None, None) => {
            let book_id = declared_id.ok_or(CatalogError::MissingIdentifier)?;
            Ok(tx.create_book(book_id).await?.id)
        }
    }
}
