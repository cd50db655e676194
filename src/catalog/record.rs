//! Incoming book records

use serde::{Deserialize, Serialize};

use crate::traits::*;
use crate::types::*;

/// A `(scheme, value)` pair naming a book under some identifier system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AliasRef {
    pub scheme: String,
    pub value: String,
}

impl AliasRef {
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }
}

/// One normalized book entry from an external source.
///
/// Field values are taken as extracted; interpretation (version parsing,
/// identity resolution) happens during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BookRecord {
    /// Identifier the record claims for its book
    #[serde(default, alias = "id")]
    pub declared_id: Option<String>,
    /// Alternate identifiers, in document order
    #[serde(default)]
    pub aliases: Vec<AliasRef>,
    /// Raw version text
    #[serde(default)]
    pub version: Option<String>,
    /// Title of the current edition
    #[serde(default)]
    pub title: String,
    /// Description of the current edition
    #[serde(default)]
    pub description: Option<String>,
}

impl BookRecord {
    /// Start building a record
    pub fn builder() -> BookRecordBuilder {
        BookRecordBuilder::default()
    }

    /// The declared identifier, if present and not blank
    pub fn declared_id(&self) -> Option<&str> {
        self.declared_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Parse the version field
    pub fn parse_version(&self) -> CatalogResult<EditionVersion> {
        EditionVersion::parse(self.version.as_deref())
    }
}

/// Record builder for assembling records in code
#[derive(Debug, Default)]
pub struct BookRecordBuilder {
    record: BookRecord,
}

impl BookRecordBuilder {
    /// Set the declared identifier
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.record.declared_id = Some(id.into());
        self
    }

    /// Add an alias
    pub fn alias(mut self, scheme: impl Into<String>, value: impl Into<String>) -> Self {
        self.record.aliases.push(AliasRef::new(scheme, value));
        self
    }

    /// Set the raw version text
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.record.version = Some(version.into());
        self
    }

    /// Set the edition title
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.record.title = title.into();
        self
    }

    /// Set the edition description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.record.description = Some(description.into());
        self
    }

    /// Build the record without validating it
    pub fn build(self) -> BookRecord {
        self.record
    }

    /// Build the record, checking it against the default rules
    pub fn build_validated(self) -> CatalogResult<BookRecord> {
        DefaultRecordValidator.validate_record(&self.record)?;
        Ok(self.record)
    }
}
