use std::io::{self, IsTerminal, Write};

use anyhow::Result;
use chrono::{DateTime, Utc};
use prdash::{PullRequestRecord, Snapshot};

const TABLE_HEADERS: &[&str] = &[
    "STATUS", "CHECKS", "ACCOUNT", "QUERY", "REPO", "AUTHOR", "AGE", "TITLE",
];
const TITLE_COLUMN_INDEX: usize = TABLE_HEADERS.len() - 1;
const COLUMN_SEPARATOR: &str = "  ";
const TITLE_TRUNCATION_SUFFIX: &str = "...";
const MIN_TITLE_WIDTH_FOR_TRUNCATION: usize = 3;

pub fn format_age(time: DateTime<Utc>) -> String {
    use chrono_humanize::HumanTime;
    HumanTime::from(time).to_string()
}

/// Query column text, marking drafts.
pub fn query_cell(record: &PullRequestRecord) -> String {
    if record.is_draft {
        format!("{} (Draft)", record.query_label)
    } else {
        record.query_label.clone()
    }
}

fn get_terminal_width() -> usize {
    if io::stdout().is_terminal() {
        crossterm::terminal::size()
            .map(|(w, _)| w as usize)
            .unwrap_or(usize::MAX)
    } else {
        usize::MAX
    }
}

fn cell_width(cell: &str) -> usize {
    cell.chars().count()
}

fn record_to_table_row(record: &PullRequestRecord) -> Vec<String> {
    vec![
        format!("{}: {}", record.priority_tier, record.priority_reason),
        record.checks_status.symbol().to_string(),
        record.account_label.clone(),
        query_cell(record),
        format!("{}#{}", record.repo, record.number),
        record.author.clone(),
        format_age(record.created_at),
        record.title.clone(),
    ]
}

fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| cell_width(h)).collect();

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell_width(cell));
            }
        }
    }

    widths
}

fn apply_title_truncation(rows: &mut [Vec<String>], widths: &mut [usize], terminal_width: usize) {
    if terminal_width == usize::MAX {
        return;
    }

    let separator_width = COLUMN_SEPARATOR.len() * (widths.len() - 1);
    let non_title_width: usize =
        widths[..TITLE_COLUMN_INDEX].iter().sum::<usize>() + separator_width;

    if non_title_width >= terminal_width {
        return;
    }

    let available = terminal_width - non_title_width;
    if available <= MIN_TITLE_WIDTH_FOR_TRUNCATION + TITLE_TRUNCATION_SUFFIX.len() {
        return;
    }

    widths[TITLE_COLUMN_INDEX] = widths[TITLE_COLUMN_INDEX].min(available);
    for row in rows {
        if let Some(title) = row.get_mut(TITLE_COLUMN_INDEX)
            && cell_width(title) > available
        {
            let keep = available - TITLE_TRUNCATION_SUFFIX.len();
            *title = format!(
                "{}{}",
                title.chars().take(keep).collect::<String>(),
                TITLE_TRUNCATION_SUFFIX
            );
        }
    }
}

fn write_cell<W: Write>(writer: &mut W, cell: &str, width: usize) -> Result<()> {
    write!(writer, "{}", cell)?;
    let pad = width.saturating_sub(cell_width(cell));
    write!(writer, "{}", " ".repeat(pad))?;
    Ok(())
}

fn render_table_row<W: Write>(cells: &[&str], widths: &[usize], writer: &mut W) -> Result<()> {
    for (i, cell) in cells.iter().enumerate() {
        if i == cells.len() - 1 {
            write!(writer, "{}", cell)?;
        } else {
            write_cell(writer, cell, widths[i])?;
            write!(writer, "{COLUMN_SEPARATOR}")?;
        }
    }
    writeln!(writer)?;
    Ok(())
}

fn render_table_separator<W: Write>(widths: &[usize], writer: &mut W) -> Result<()> {
    let dashes: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    writeln!(writer, "{}", dashes.join(COLUMN_SEPARATOR))?;
    Ok(())
}

fn display_records_with_width<W: Write>(
    records: &[PullRequestRecord],
    writer: &mut W,
    terminal_width: usize,
) -> Result<()> {
    let mut rows: Vec<Vec<String>> = records.iter().map(record_to_table_row).collect();
    let mut widths = calculate_column_widths(TABLE_HEADERS, &rows);

    apply_title_truncation(&mut rows, &mut widths, terminal_width);

    render_table_row(TABLE_HEADERS, &widths, writer)?;
    render_table_separator(&widths, writer)?;
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        render_table_row(&cells, &widths, writer)?;
    }

    Ok(())
}

/// Prints the snapshot as a plain table followed by any partial failures.
pub fn display_snapshot<W: Write>(snapshot: &Snapshot, writer: &mut W) -> Result<()> {
    display_snapshot_with_width(snapshot, writer, get_terminal_width())
}

fn display_snapshot_with_width<W: Write>(
    snapshot: &Snapshot,
    writer: &mut W,
    terminal_width: usize,
) -> Result<()> {
    display_records_with_width(&snapshot.records, writer, terminal_width)?;

    writeln!(
        writer,
        "\n{} pull requests, updated {}",
        snapshot.records.len(),
        snapshot.fetched_at.format("%H:%M:%S UTC")
    )?;
    for failure in &snapshot.partial_failures {
        writeln!(writer, "Warning: {failure}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use prdash::{
        ChecksStatus, FetchError, PartialFailure, PriorityTier, QueryKind, ReviewDecision,
    };

    use super::*;

    fn record(title: &str, draft: bool) -> PullRequestRecord {
        PullRequestRecord {
            account_label: "Work".to_string(),
            query_label: "My PRs".to_string(),
            query_kind: QueryKind::Authored,
            repo: "org/x".to_string(),
            number: 42,
            title: title.to_string(),
            url: "https://github.com/org/x/pull/42".to_string(),
            author: "me".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
            is_draft: draft,
            review_decision: ReviewDecision::ChangesRequested,
            is_author_self: true,
            assignees: vec![],
            head_sha: None,
            checks_status: ChecksStatus::Failure,
            priority_tier: PriorityTier::High,
            priority_reason: "Checks Failing".to_string(),
        }
    }

    fn snapshot(records: Vec<PullRequestRecord>) -> Snapshot {
        Snapshot {
            records,
            fetched_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            partial_failures: vec![],
        }
    }

    #[test]
    fn test_display_table() {
        let mut output = Vec::new();
        display_snapshot_with_width(
            &snapshot(vec![record("Fix race", true)]),
            &mut output,
            usize::MAX,
        )
        .unwrap();

        let result = String::from_utf8(output).unwrap();
        for header in TABLE_HEADERS {
            assert!(result.contains(header));
        }
        assert!(result.contains("High: Checks Failing"));
        assert!(result.contains("✗"));
        assert!(result.contains("My PRs (Draft)"));
        assert!(result.contains("org/x#42"));
        assert!(result.contains("Fix race"));
        assert!(result.contains("1 pull requests, updated 12:00:00 UTC"));
    }

    #[test]
    fn test_long_titles_truncated_to_width() {
        let long_title = "t".repeat(200);
        let mut output = Vec::new();
        display_snapshot_with_width(
            &snapshot(vec![record(&long_title, false)]),
            &mut output,
            120,
        )
        .unwrap();

        let result = String::from_utf8(output).unwrap();
        let row = result.lines().nth(2).unwrap();
        assert!(row.ends_with("..."));
        assert!(row.chars().count() <= 120);
    }

    #[test]
    fn test_empty_snapshot_shows_headers_and_failures() {
        let mut snap = snapshot(vec![]);
        snap.partial_failures.push(PartialFailure {
            account_label: "Work".to_string(),
            query_label: "Review Requested".to_string(),
            error: FetchError::AuthFailure,
        });
        let mut output = Vec::new();
        display_snapshot_with_width(&snap, &mut output, usize::MAX).unwrap();

        let result = String::from_utf8(output).unwrap();
        assert!(result.contains("STATUS"));
        assert!(result.contains("----"));
        assert!(result.contains("0 pull requests"));
        assert!(result.contains("Warning: Work / Review Requested: authentication failed"));
    }
}
