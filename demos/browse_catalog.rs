//! Browsing example: build an in-memory catalog and walk it the way an
//! administrative listing would

use catalog_core::utils::MemoryCatalog;
use catalog_core::{BookRecord, Catalog};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("📖 Catalog Core - Browsing Example\n");

    let catalog = Catalog::new(MemoryCatalog::new());

    let records = [
        BookRecord::builder()
            .id("9781593278281")
            .alias("isbn10", "1593278284")
            .version("1.0")
            .title("The Rust Programming Language")
            .build(),
        BookRecord::builder()
            .id("9781718503106")
            .alias("isbn10", "1593278284")
            .version("2.0")
            .title("The Rust Programming Language, 2nd Edition")
            .description("Covers Rust 2021")
            .build(),
        BookRecord::builder()
            .id("9781492052593")
            .alias("isbn13", "978-1-492-05259-3")
            .version("1.0")
            .title("Programming Rust")
            .build(),
    ];

    for record in &records {
        let book_id = catalog.reconcile(record).await?;
        println!("  ✓ {} → book {book_id}", record.title);
    }

    println!("\n📋 Books");
    for summary in catalog.book_summaries().await? {
        println!(
            "  {} | {} | {} edition(s)",
            summary.id,
            summary.title.as_deref().unwrap_or("(untitled)"),
            summary.number_of_editions
        );

        for edition in catalog.editions(&summary.id).await? {
            println!(
                "      v{} {}{}",
                edition.version,
                edition.title,
                edition
                    .description
                    .as_deref()
                    .map(|d| format!(" ({d})"))
                    .unwrap_or_default()
            );
        }
        for alias in catalog.aliases(&summary.id).await? {
            println!("      {} identifier {}", alias.scheme, alias.value);
        }
    }

    let report = catalog.check_integrity().await?;
    println!(
        "\n🔍 Integrity: {} ({} books, {} editions, {} aliases)",
        if report.is_valid { "OK" } else { "ISSUES FOUND" },
        report.books,
        report.editions,
        report.aliases
    );

    Ok(())
}
