use chrono::Local;
use prdash::{
    ChecksStatus, DashboardState, PriorityTier, RefreshPhase, Snapshot,
    scheduler::{Notice, NoticeLevel},
};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
};

use crate::display::{format_age, query_cell};

const MAX_VISIBLE_NOTICES: usize = 4;

pub fn draw(f: &mut Frame, state: &DashboardState, table: &mut TableState) {
    let visible_notices = state.notices.len().min(MAX_VISIBLE_NOTICES);
    let notices_height = if visible_notices == 0 {
        0
    } else {
        visible_notices as u16 + 2
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(notices_height),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_header(f, state, chunks[0]);
    draw_pull_requests(f, state.snapshot.as_deref(), chunks[1], table);
    if visible_notices > 0 {
        draw_notices(f, &state.notices, chunks[2]);
    }
    draw_footer(f, chunks[3]);
}

fn tier_color(tier: PriorityTier) -> Color {
    match tier {
        PriorityTier::High => Color::Red,
        PriorityTier::Medium => Color::Yellow,
        PriorityTier::Low => Color::Green,
        PriorityTier::Watching => Color::DarkGray,
    }
}

fn checks_color(status: ChecksStatus) -> Color {
    match status {
        ChecksStatus::Success => Color::Green,
        ChecksStatus::Failure => Color::Red,
        ChecksStatus::Pending => Color::Yellow,
        ChecksStatus::None => Color::DarkGray,
    }
}

fn draw_header(f: &mut Frame, state: &DashboardState, area: Rect) {
    let mut spans = vec![Span::styled(
        " prdash ",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];

    match &state.snapshot {
        Some(snapshot) => {
            spans.push(Span::raw(format!(" {} PRs ", snapshot.records.len())));
            spans.push(Span::styled(
                format!(
                    "updated {} ",
                    snapshot.fetched_at.with_timezone(&Local).format("%H:%M:%S")
                ),
                Style::default().fg(Color::DarkGray),
            ));
        }
        None => spans.push(Span::styled(
            " waiting for first refresh ",
            Style::default().fg(Color::DarkGray),
        )),
    }

    if state.phase == RefreshPhase::Fetching {
        spans.push(Span::styled(
            " refreshing… ",
            Style::default().fg(Color::Yellow),
        ));
    }

    if let Some(stale) = &state.stale {
        spans.push(Span::styled(
            format!(" {stale} "),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        ));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn draw_pull_requests(f: &mut Frame, snapshot: Option<&Snapshot>, area: Rect, table: &mut TableState) {
    let block = Block::default()
        .title(" Pull Requests ")
        .borders(Borders::ALL);

    let records = snapshot.map(|s| s.records.as_slice()).unwrap_or_default();
    if records.is_empty() {
        let text = if snapshot.is_some() {
            "Nothing needs your attention"
        } else {
            "Loading…"
        };
        let para = Paragraph::new(Line::from(Span::styled(
            text,
            Style::default().fg(Color::DarkGray),
        )))
        .block(block);
        f.render_widget(para, area);
        return;
    }

    let header = Row::new(vec![
        "Status", "Checks", "Account", "Query", "Repo", "Title", "Author", "Age",
    ])
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = records
        .iter()
        .map(|record| {
            Row::new(vec![
                Cell::from(record.priority_reason.clone())
                    .style(Style::default().fg(tier_color(record.priority_tier))),
                Cell::from(record.checks_status.symbol())
                    .style(Style::default().fg(checks_color(record.checks_status))),
                Cell::from(record.account_label.clone()),
                Cell::from(query_cell(record)),
                Cell::from(format!("{}#{}", record.repo, record.number)),
                Cell::from(record.title.clone()),
                Cell::from(record.author.clone()),
                Cell::from(format_age(record.created_at)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(26),
        Constraint::Length(6),
        Constraint::Length(12),
        Constraint::Length(22),
        Constraint::Length(28),
        Constraint::Min(20),
        Constraint::Length(16),
        Constraint::Length(14),
    ];

    let table_widget = Table::new(rows, widths)
        .header(header)
        .block(block)
        .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    f.render_stateful_widget(table_widget, area, table);
}

fn draw_notices(f: &mut Frame, notices: &[Notice], area: Rect) {
    let lines: Vec<Line> = notices
        .iter()
        .rev()
        .take(MAX_VISIBLE_NOTICES)
        .map(|notice| {
            let color = match notice.level {
                NoticeLevel::Info => Color::Cyan,
                NoticeLevel::Warning => Color::Yellow,
                NoticeLevel::Error => Color::Red,
            };
            Line::from(vec![
                Span::styled(
                    format!("{} ", notice.at.with_timezone(&Local).format("%H:%M:%S")),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(notice.message.clone(), Style::default().fg(color)),
            ])
        })
        .collect();

    let title = format!(" Notices ({}) ", notices.len());
    let para = Paragraph::new(lines).block(Block::default().title(title).borders(Borders::ALL));
    f.render_widget(para, area);
}

fn draw_footer(f: &mut Frame, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
    let line = Line::from(vec![
        key("  [j/k]"),
        Span::raw(" move  "),
        key("[Enter/o]"),
        Span::raw(" open  "),
        key("[r]"),
        Span::raw("efresh  "),
        key("[x]"),
        Span::raw(" dismiss notices  "),
        key("[q]"),
        Span::raw("uit"),
    ]);
    f.render_widget(Paragraph::new(line), area);
}
