//! Import a JSON file of book records into a SQLite catalog
//!
//! ```text
//! cargo run --example import_records -- demos/data/records.json
//! CATALOG_DB=/tmp/catalog.db RUST_LOG=debug cargo run --example import_records
//! ```

use catalog_core::utils::{EnhancedRecordValidator, SqliteCatalog, SqliteOptions};
use catalog_core::{BookRecord, Catalog, ReconcilerOptions};
use tracing_subscriber::EnvFilter;

const SAMPLE: &str = include_str!("data/records.json");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let input = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(path)?,
        None => SAMPLE.to_string(),
    };
    let records: Vec<BookRecord> = serde_json::from_str(&input)?;

    let mut options = SqliteOptions::default();
    if let Ok(path) = std::env::var("CATALOG_DB") {
        options.path = path.into();
    }
    tracing::info!(path = %options.path.display(), records = records.len(), "Importing records");

    let store = SqliteCatalog::open(options)?;
    let catalog = Catalog::with_validator(store, Box::new(EnhancedRecordValidator))
        .with_options(ReconcilerOptions { max_attempts: 5 });

    let mut imported = 0;
    let mut rejected = 0;
    for (index, record) in records.iter().enumerate() {
        // One bad record never stops the rest of the file.
        match catalog.reconcile_with_retry(record).await {
            Ok(book_id) => {
                imported += 1;
                println!("  ✓ record {index}: merged into book {book_id}");
            }
            Err(err) => {
                rejected += 1;
                println!("  ✗ record {index}: {err}");
            }
        }
    }

    println!("\n📚 {imported} imported, {rejected} rejected\n");
    for summary in catalog.book_summaries().await? {
        println!(
            "  {:<16} {:<55} {} edition(s)",
            summary.id,
            summary.title.as_deref().unwrap_or("-"),
            summary.number_of_editions
        );
    }

    let report = catalog.check_integrity().await?;
    if !report.is_valid {
        for issue in &report.issues {
            tracing::error!(%issue, "Catalog integrity issue");
        }
    }

    Ok(())
}
