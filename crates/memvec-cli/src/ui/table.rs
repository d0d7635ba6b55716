//! Table rendering for CLI output using comfy-table.
//!
//! | Command | Table Function |
//! |---------|----------------|
//! | `memvec search` | `render_hits_table()` |
//! | `memvec list` | `render_records_table()` |
//! | `memvec stats`, `memvec bench` | `render_metrics_table()` |

use chrono::{DateTime, Utc};
use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, ColumnConstraint, Table, Width};

use super::format::{format_relative_time, truncate_str};

/// Widest content preview shown in a table cell.
const CONTENT_WIDTH: usize = 60;

/// One search result row.
#[derive(Debug, Clone)]
pub struct HitRow {
    pub score: String,
    pub id: String,
    pub memory_type: String,
    pub content: String,
}

/// One stored record row.
#[derive(Debug, Clone)]
pub struct RecordRow {
    pub id: String,
    pub memory_type: String,
    pub tags: Vec<String>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    pub content: String,
}

/// Render ranked search results.
///
/// ```text
/// #  SCORE  ID        TYPE        CONTENT
/// 1  0.912  pizza     preference  pizza preference
/// ```
pub fn render_hits_table(hits: &[HitRow]) -> String {
    if hits.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![
        Cell::new("#").set_alignment(CellAlignment::Right),
        Cell::new("SCORE").set_alignment(CellAlignment::Right),
        Cell::new("ID"),
        Cell::new("TYPE"),
        Cell::new("CONTENT"),
    ]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(2)), // #
        ColumnConstraint::LowerBoundary(Width::Fixed(6)), // SCORE
        ColumnConstraint::LowerBoundary(Width::Fixed(8)), // ID
        ColumnConstraint::LowerBoundary(Width::Fixed(6)), // TYPE
    ]);

    for (rank, hit) in hits.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1).set_alignment(CellAlignment::Right),
            Cell::new(&hit.score).set_alignment(CellAlignment::Right),
            Cell::new(&hit.id),
            Cell::new(&hit.memory_type),
            Cell::new(truncate_str(&hit.content, CONTENT_WIDTH)),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Render stored records, one per row.
pub fn render_records_table(records: &[RecordRow]) -> String {
    if records.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![
        Cell::new("ID"),
        Cell::new("TYPE"),
        Cell::new("TAGS"),
        Cell::new("HITS").set_alignment(CellAlignment::Right),
        Cell::new("ACCESSED"),
        Cell::new("CONTENT"),
    ]);

    for record in records {
        let tags = if record.tags.is_empty() {
            "-".to_string()
        } else {
            truncate_str(&record.tags.join(","), 20)
        };
        table.add_row(vec![
            Cell::new(&record.id),
            Cell::new(&record.memory_type),
            Cell::new(tags),
            Cell::new(record.access_count).set_alignment(CellAlignment::Right),
            Cell::new(format_relative_time(record.last_accessed)),
            Cell::new(truncate_str(&record.content, CONTENT_WIDTH)),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Render a simple key-value metrics table.
pub fn render_metrics_table(metrics: &[(&str, String)]) -> String {
    if metrics.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![
        Cell::new("METRIC"),
        Cell::new("VALUE").set_alignment(CellAlignment::Right),
    ]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(18)), // METRIC
        ColumnConstraint::LowerBoundary(Width::Fixed(12)), // VALUE
    ]);

    for (key, value) in metrics {
        table.add_row(vec![
            Cell::new(*key),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }

    table.trim_fmt().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hits_table_ranks_rows() {
        let output = render_hits_table(&[
            HitRow {
                score: "0.912".into(),
                id: "pizza".into(),
                memory_type: "preference".into(),
                content: "pizza preference".into(),
            },
            HitRow {
                score: "0.401".into(),
                id: "dark-mode".into(),
                memory_type: "preference".into(),
                content: "dark mode preference".into(),
            },
        ]);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("SCORE"));
        assert!(lines[1].contains("pizza") && lines[1].trim_start().starts_with('1'));
        assert!(lines[2].contains("dark-mode"));
    }

    #[test]
    fn test_records_table_truncates_content() {
        let output = render_records_table(&[RecordRow {
            id: "long".into(),
            memory_type: "note".into(),
            tags: vec![],
            access_count: 3,
            last_accessed: Utc::now(),
            content: "x".repeat(200),
        }]);
        assert!(output.contains("just now"));
        assert!(output.contains("..."));
        assert!(!output.contains(&"x".repeat(100)));
    }

    #[test]
    fn test_empty_tables_render_nothing() {
        assert!(render_hits_table(&[]).is_empty());
        assert!(render_records_table(&[]).is_empty());
        assert!(render_metrics_table(&[]).is_empty());
    }

    #[test]
    fn test_metrics_table() {
        let output = render_metrics_table(&[("Records", "1,000".to_string())]);
        assert!(output.contains("Records"));
        assert!(output.contains("1,000"));
    }
}
