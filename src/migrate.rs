use anyhow::Result;
use sqlx::SqlitePool;

/// Create the chunk table and its indexes. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Rowid order is insertion order; search uses it to break ties.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_name TEXT NOT NULL,
            page_number INTEGER NOT NULL,
            section_path TEXT NOT NULL DEFAULT '',
            chunk_size INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL,
            model TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_name ON chunks(document_name)")
        .execute(pool)
        .await?;

    Ok(())
}
