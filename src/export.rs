use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::{FileOptions, ZipWriter};

use crate::diagram::DiagramRecord;

/// Zips every diagram owned by `owner` as `<name>.json`. Returns an empty
/// buffer when the owner has no diagrams.
pub async fn export_all_diagrams(pool: &SqlitePool, owner: &str) -> Result<Vec<u8>> {
    let summaries = DiagramRecord::list_by_owner(pool, owner).await?;
    if summaries.is_empty() {
        return Ok(Vec::new());
    }

    let mut cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut cursor);
    let options: FileOptions<()> = FileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);

    let mut used = HashSet::new();
    for summary in &summaries {
        let Some(record) = DiagramRecord::get_by_id(pool, &summary.id, owner).await? else {
            continue;
        };
        let filename = entry_name(&record.name, &record.id, &mut used);
        let body = serde_json::to_vec_pretty(&record).context("Failed to serialize diagram")?;

        zip.start_file(filename, options)
            .context("Failed to start zip file entry")?;
        zip.write_all(&body).context("Failed to write diagram content")?;
    }

    zip.finish().context("Failed to finalize ZIP file")?;
    Ok(cursor.into_inner())
}

/// A safe, unique entry name for one diagram.
fn entry_name(name: &str, id: &str, used: &mut HashSet<String>) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    let stem = if cleaned.is_empty() { id.to_string() } else { cleaned };

    let mut candidate = format!("{stem}.json");
    if used.contains(&candidate) {
        candidate = format!("{stem}-{id}.json");
    }
    used.insert(candidate.clone());
    candidate
}
