//! Core types and data structures for the book catalog

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Total number of digits an edition version may carry
pub const VERSION_MAX_DIGITS: u32 = 4;

/// Number of fractional digits an edition version is stored with
pub const VERSION_DECIMAL_PLACES: i64 = 1;

fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

/// Identity root for a title, addressed by a stable external identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Primary identifier supplied by the publisher
    pub id: String,
    /// When the book was created
    pub created_at: NaiveDateTime,
    /// When the book was last updated
    pub updated_at: NaiveDateTime,
}

impl Book {
    /// Create a new book
    pub fn new(id: String) -> Self {
        let now = now();
        Self {
            id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Version number of an edition.
///
/// Versions are decimal numbers with at most four digits, one of them
/// fractional (`1.0`, `2.1`, `999.9`). They are kept in canonical form, so
/// `1`, `1.0` and `1.00` compare and hash identically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EditionVersion(BigDecimal);

impl EditionVersion {
    /// Parse the version field of an incoming record.
    ///
    /// An absent field is [`CatalogError::MalformedVersion`]. A present field
    /// that is not a decimal number, or is out of range for a version, is
    /// [`CatalogError::InvalidVersion`].
    pub fn parse(raw: Option<&str>) -> CatalogResult<Self> {
        raw.ok_or(CatalogError::MalformedVersion)?.parse()
    }

    /// Borrow the underlying decimal
    pub fn as_decimal(&self) -> &BigDecimal {
        &self.0
    }
}

impl TryFrom<BigDecimal> for EditionVersion {
    type Error = CatalogError;

    fn try_from(value: BigDecimal) -> CatalogResult<Self> {
        // Bounds are read off the normalized mantissa and exponent; nothing is
        // rescaled until the value is known to fit.
        let normalized = value.normalized();
        let scale = normalized.fractional_digit_count();
        if scale > VERSION_DECIMAL_PLACES {
            return Err(CatalogError::InvalidVersion(format!(
                "{normalized} is out of range: more than {VERSION_DECIMAL_PLACES} decimal place"
            )));
        }

        let integer_digits = normalized.digits() as i64 - scale;
        if integer_digits > i64::from(VERSION_MAX_DIGITS) - VERSION_DECIMAL_PLACES {
            return Err(CatalogError::InvalidVersion(format!(
                "{normalized} is out of range: more than {VERSION_MAX_DIGITS} digits"
            )));
        }

        Ok(Self(normalized.with_scale(VERSION_DECIMAL_PLACES)))
    }
}

impl FromStr for EditionVersion {
    type Err = CatalogError;

    fn from_str(s: &str) -> CatalogResult<Self> {
        let value = BigDecimal::from_str(s.trim()).map_err(|_| {
            CatalogError::InvalidVersion(format!("{s:?} is not a decimal number"))
        })?;
        Self::try_from(value)
    }
}

impl TryFrom<String> for EditionVersion {
    type Error = CatalogError;

    fn try_from(value: String) -> CatalogResult<Self> {
        value.parse()
    }
}

impl From<EditionVersion> for String {
    fn from(version: EditionVersion) -> Self {
        version.to_string()
    }
}

impl fmt::Display for EditionVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Versioned snapshot of a book's descriptive content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edition {
    /// Surrogate identifier
    pub id: Uuid,
    /// Owning book
    pub book_id: String,
    /// Version of the book this edition describes
    pub version: EditionVersion,
    /// Title of this edition
    pub title: String,
    /// Very short description of this edition
    pub description: Option<String>,
    /// When the edition was created
    pub created_at: NaiveDateTime,
    /// When the edition was last updated
    pub updated_at: NaiveDateTime,
}

impl Edition {
    /// Create a new, untitled edition
    pub fn new(book_id: String, version: EditionVersion) -> Self {
        let now = now();
        Self {
            id: Uuid::new_v4(),
            book_id,
            version,
            title: String::new(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the descriptive content of this edition
    pub fn set_content(&mut self, title: String, description: Option<String>) {
        self.title = title;
        self.description = description;
        self.updated_at = now();
    }
}

/// Alternate identifier by which a book may be recognized, such as an
/// ISBN-10 or ISBN-13
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// Surrogate identifier
    pub id: Uuid,
    /// Owning book
    pub book_id: String,
    /// Identifier scheme (`isbn10`, `isbn13`, ...)
    pub scheme: String,
    /// Identifier value, unique across all schemes
    pub value: String,
    /// When the alias was created
    pub created_at: NaiveDateTime,
    /// When the alias was last updated
    pub updated_at: NaiveDateTime,
}

impl Alias {
    /// Create a new alias
    pub fn new(book_id: String, scheme: String, value: String) -> Self {
        let now = now();
        Self {
            id: Uuid::new_v4(),
            book_id,
            scheme,
            value,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this alias carries the given scheme and value
    pub fn matches(&self, scheme: &str, value: &str) -> bool {
        self.scheme == scheme && self.value == value
    }
}

/// Errors that can occur in the catalog
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("The version number is missing from this record")]
    MalformedVersion,
    #[error("Invalid version data: {0}")]
    InvalidVersion(String),
    #[error("The aliases in this record match more than one book: {}", books.join(", "))]
    AmbiguousAliasMatch { books: Vec<String> },
    #[error("The record has no identifier and matches no existing book")]
    MissingIdentifier,
    #[error("Store conflict: {0}")]
    StoreConflict(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Book not found: {0}")]
    BookNotFound(String),
}

impl CatalogError {
    /// Whether running the whole reconciliation again may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::StoreConflict(_))
    }
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;
