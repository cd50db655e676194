//! Catalog module containing incoming records and the catalog facade

pub mod core;
pub mod record;

pub use self::core::*;
pub use record::*;
