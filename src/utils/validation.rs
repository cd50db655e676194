//! Validation utilities

use crate::catalog::record::BookRecord;
use crate::traits::*;
use crate::types::*;

/// Longest book ID accepted
pub const MAX_BOOK_ID_LEN: usize = 30;
/// Longest edition title accepted
pub const MAX_TITLE_LEN: usize = 128;
/// Longest alias scheme accepted
pub const MAX_SCHEME_LEN: usize = 40;
/// Longest alias value accepted
pub const MAX_ALIAS_VALUE_LEN: usize = 255;

fn validate_length(field: &str, value: &str, max: usize) -> CatalogResult<()> {
    if value.chars().count() > max {
        return Err(CatalogError::Validation(format!(
            "{field} cannot exceed {max} characters"
        )));
    }
    Ok(())
}

/// Validate that a book ID is valid
pub fn validate_book_id(book_id: &str) -> CatalogResult<()> {
    if book_id.trim().is_empty() {
        return Err(CatalogError::Validation(
            "Book ID cannot be empty".to_string(),
        ));
    }

    validate_length("Book ID", book_id, MAX_BOOK_ID_LEN)?;

    if book_id.chars().any(char::is_control) {
        return Err(CatalogError::Validation(
            "Book ID cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate that an edition title is valid
pub fn validate_title(title: &str) -> CatalogResult<()> {
    if title.trim().is_empty() {
        return Err(CatalogError::Validation(
            "Edition title cannot be empty".to_string(),
        ));
    }

    validate_length("Edition title", title, MAX_TITLE_LEN)
}

/// Validate that an alias scheme and value are valid
pub fn validate_alias(scheme: &str, value: &str) -> CatalogResult<()> {
    if scheme.trim().is_empty() || value.trim().is_empty() {
        return Err(CatalogError::Validation(
            "Alias scheme and value cannot be empty".to_string(),
        ));
    }

    validate_length("Alias scheme", scheme, MAX_SCHEME_LEN)?;
    validate_length("Alias value", value, MAX_ALIAS_VALUE_LEN)
}

/// Enhanced record validator enforcing the catalog's field limits
pub struct EnhancedRecordValidator;

impl RecordValidator for EnhancedRecordValidator {
    fn validate_record(&self, record: &BookRecord) -> CatalogResult<()> {
        if let Some(book_id) = record.declared_id() {
            validate_book_id(book_id)?;
        }

        validate_title(&record.title)?;

        for alias in &record.aliases {
            validate_alias(&alias.scheme, &alias.value)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_id_limits() {
        assert!(validate_book_id("9780596520687").is_ok());
        assert!(validate_book_id("").is_err());
        assert!(validate_book_id(&"x".repeat(31)).is_err());
        assert!(validate_book_id("a\nb").is_err());
    }

    #[test]
    fn test_enhanced_validator() {
        let ok = BookRecord::builder()
            .id("A")
            .alias("isbn10", "0596520689")
            .version("1.0")
            .title("Title")
            .build();
        assert!(EnhancedRecordValidator.validate_record(&ok).is_ok());

        let long_title = BookRecord::builder()
            .id("A")
            .title("t".repeat(129))
            .build();
        assert!(matches!(
            EnhancedRecordValidator.validate_record(&long_title),
            Err(CatalogError::Validation(_))
        ));

        let long_scheme = BookRecord::builder()
            .id("A")
            .title("Title")
            .alias("s".repeat(41), "1")
            .build();
        assert!(EnhancedRecordValidator.validate_record(&long_scheme).is_err());
    }

    #[test]
    fn test_missing_id_is_not_a_validation_error() {
        let record = BookRecord::builder().title("Title").build();
        assert!(EnhancedRecordValidator.validate_record(&record).is_ok());
    }
}
