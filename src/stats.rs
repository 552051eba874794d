//! Index statistics for `rag stats`.

use anyhow::Result;

use crate::index_manager::{IndexManager, IndexState, IndexStats};

/// Print the index summary, as a table or as JSON.
pub async fn run_stats(manager: &IndexManager, json: bool) -> Result<()> {
    let stats = manager.stats().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats);
    }
    Ok(())
}

pub fn print_stats(stats: &IndexStats) {
    let state = match stats.state {
        IndexState::Present => "present",
        IndexState::Absent => "absent",
    };

    println!("Rulebook RAG: Index Stats");
    println!("=========================");
    println!();
    println!("  State:       {}", state);
    println!("  Index:       {}", stats.index_path.display());
    println!("  Size:        {}", format_bytes(stats.index_size_bytes));
    println!();
    println!("  Documents:   {}", stats.document_count);
    println!("  Chunks:      {}", stats.chunk_count);
    println!("  Processed:   {} file(s)", stats.processed_file_count);
    println!(
        "  Updated:     {}",
        stats.last_update.as_deref().unwrap_or("never")
    );
    println!();
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }
}
