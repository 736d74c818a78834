//! Output formatting for the Stash CLI.

use std::collections::BTreeMap;

use comfy_table::{presets, Attribute, Cell, ContentArrangement, Table};
use serde_json::Value;

use stash_core::{FileRecord, Folder, Item, Record};

const SUMMARY_MAX: usize = 60;

/// Truncate a string to max length, adding ellipsis if needed.
pub fn truncate(s: &str, max_len: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return s.chars().take(max_len).collect();
    }
    let truncated: String = s.chars().take(max_len - 3).collect();
    format!("{}...", truncated)
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn simple_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(
        headers
            .iter()
            .map(|header| Cell::new(header).add_attribute(Attribute::Dim)),
    );
    for i in 0..headers.len() {
        if let Some(column) = table.column_mut(i) {
            column.set_padding((0, 2));
        }
    }
    for row in rows {
        table.add_row(row);
    }
    table.to_string()
}

fn field_summary(record: &Record) -> String {
    let parts: Vec<String> = record
        .fields
        .iter()
        .map(|(key, value)| match value {
            Value::String(text) => format!("{}={}", key, text),
            other => format!("{}={}", key, other),
        })
        .collect();
    truncate(&parts.join(" "), SUMMARY_MAX)
}

pub fn records_table(records: &[Record]) -> String {
    let rows = records
        .iter()
        .map(|record| {
            vec![
                record.id.clone(),
                record.updated_date.format("%Y-%m-%d %H:%M").to_string(),
                field_summary(record),
            ]
        })
        .collect();
    simple_table(&["ID", "UPDATED", "FIELDS"], rows)
}

pub fn folders_table(folders: &[Folder]) -> String {
    let rows = folders
        .iter()
        .map(|folder| vec![folder.id.clone(), folder.name.clone()])
        .collect();
    simple_table(&["ID", "NAME"], rows)
}

pub fn items_table(items: &[Item]) -> String {
    let rows = items
        .iter()
        .map(|item| {
            let tags: Vec<&str> = item.tags.iter().map(String::as_str).collect();
            vec![
                item.id.clone(),
                truncate(&item.title, SUMMARY_MAX),
                tags.join(","),
            ]
        })
        .collect();
    simple_table(&["ID", "TITLE", "TAGS"], rows)
}

/// Folder sizes with each folder's full path as its label.
pub fn sizes_table(sizes: &[(String, u64)]) -> String {
    let rows = sizes
        .iter()
        .map(|(path, bytes)| vec![path.clone(), format_bytes(*bytes)])
        .collect();
    simple_table(&["FOLDER", "SIZE"], rows)
}

pub fn file_line(file: &FileRecord) -> String {
    format!("{} ({}, {})", file.id, file.mime, format_bytes(file.size))
}

pub fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn sizes_json(sizes: &BTreeMap<String, u64>) -> Value {
    serde_json::to_value(sizes).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer string", 8), "a lon...");
        assert_eq!(truncate("abcdef", 2), "ab");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_records_table_lists_ids() {
        let mut fields = stash_core::storage::Fields::new();
        fields.insert("name".to_string(), Value::String("Checking".to_string()));
        let record = Record::new(fields);

        let rendered = records_table(std::slice::from_ref(&record));
        assert!(rendered.contains(&record.id));
        assert!(rendered.contains("name=Checking"));
    }
}
