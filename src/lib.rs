//! # Catalog Core
//!
//! A book catalog library that reconciles externally supplied book records
//! against existing books, editions and aliases without creating duplicate
//! or conflicting entries.
//!
//! ## Features
//!
//! - **Reconciliation**: Match records by declared ID or by alias, reject records whose aliases disagree
//! - **Versioned editions**: One edition per book and version, overwritten in place on every sighting
//! - **Aliases**: ISBN-10, ISBN-13 or any other scheme, each value owned by exactly one book
//! - **Transactions**: Every record is merged atomically or not at all
//! - **Storage abstraction**: Database-agnostic design with in-memory and SQLite backends
//!
//! ## Quick Start
//!
//! ```rust
//! use catalog_core::utils::MemoryCatalog;
//! use catalog_core::{BookRecord, Catalog};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), catalog_core::CatalogError> {
//! let catalog = Catalog::new(MemoryCatalog::new());
//!
//! let record = BookRecord::builder()
//!     .id("9780596520687")
//!     .alias("isbn10", "0596520689")
//!     .version("1.0")
//!     .title("Hackers & Painters")
//!     .build();
//!
//! let book_id = catalog.reconcile(&record).await?;
//! assert_eq!(book_id, "9780596520687");
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod reconciliation;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use catalog::{AliasRef, BookRecord, BookRecordBuilder, Catalog};
pub use reconciliation::*;
pub use traits::*;
pub use types::*;
