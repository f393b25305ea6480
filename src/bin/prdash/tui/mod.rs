pub mod render;

use std::{io::stdout, panic, time::Duration};

use anyhow::Result;
use crossterm::{
    ExecutableCommand, cursor,
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use prdash::{DashboardState, Trigger, scheduler::NoticeLevel};
use ratatui::{prelude::*, widgets::TableState};
use tokio::sync::{mpsc, watch};

use crate::opener::Opener;

/// What a key press asks the dashboard to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    NavigateUp,
    NavigateDown,
    OpenSelected,
    ForceRefresh,
    Dismiss,
    Quit,
}

pub fn key_action(key: KeyEvent) -> Option<KeyAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(KeyAction::Quit)
        }
        KeyCode::Char('q') | KeyCode::Esc => Some(KeyAction::Quit),
        KeyCode::Char('k') | KeyCode::Up => Some(KeyAction::NavigateUp),
        KeyCode::Char('j') | KeyCode::Down => Some(KeyAction::NavigateDown),
        KeyCode::Enter | KeyCode::Char('o') => Some(KeyAction::OpenSelected),
        KeyCode::Char('r') => Some(KeyAction::ForceRefresh),
        KeyCode::Char('x') => Some(KeyAction::Dismiss),
        _ => None,
    }
}

/// Keeps the selection on a valid row after the row count changed.
fn clamp_selection(selected: Option<usize>, rows: usize) -> Option<usize> {
    match (selected, rows) {
        (_, 0) => None,
        (None, _) => Some(0),
        (Some(i), n) => Some(i.min(n - 1)),
    }
}

fn move_selection(selected: Option<usize>, rows: usize, down: bool) -> Option<usize> {
    let current = clamp_selection(selected, rows)?;
    if down {
        Some((current + 1).min(rows - 1))
    } else {
        Some(current.saturating_sub(1))
    }
}

fn row_count(state: &DashboardState) -> usize {
    state.snapshot.as_ref().map_or(0, |s| s.records.len())
}

/// Run the dashboard UI until the user quits.
///
/// Reads state from `state_rx` and sends refresh and notice requests on
/// `triggers`.
pub async fn run_tui(
    state_rx: watch::Receiver<DashboardState>,
    triggers: mpsc::Sender<Trigger>,
    opener: &dyn Opener,
) -> Result<()> {
    chain_panic_hook(|| {
        let _ = restore_terminal();
    });
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = tui_loop(&mut terminal, state_rx, triggers, opener).await;

    restore_terminal()?;

    result
}

fn restore_terminal() -> std::io::Result<()> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    stdout().execute(cursor::Show)?;
    Ok(())
}

/// Runs `cleanup` before the existing panic hook, so the panic message
/// lands on a usable terminal.
fn chain_panic_hook(cleanup: impl Fn() + Send + Sync + 'static) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        cleanup();
        previous(info);
    }));
}

async fn tui_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    mut state_rx: watch::Receiver<DashboardState>,
    triggers: mpsc::Sender<Trigger>,
    opener: &dyn Opener,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut table = TableState::default();
    // Ages and the "updated" clock drift between snapshots.
    let mut redraw = tokio::time::interval(Duration::from_secs(1));

    loop {
        let state = state_rx.borrow_and_update().clone();
        table.select(clamp_selection(table.selected(), row_count(&state)));
        terminal.draw(|f| render::draw(f, &state, &mut table))?;

        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
            _ = redraw.tick() => {}
            maybe_event = events.next() => {
                let key = match maybe_event {
                    Some(Ok(Event::Key(key))) => key,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                };
                let Some(action) = key_action(key) else {
                    continue;
                };

                match action {
                    KeyAction::Quit => return Ok(()),
                    KeyAction::NavigateUp => {
                        table.select(move_selection(table.selected(), row_count(&state), false));
                    }
                    KeyAction::NavigateDown => {
                        table.select(move_selection(table.selected(), row_count(&state), true));
                    }
                    KeyAction::ForceRefresh => {
                        // A full channel means a refresh is already queued.
                        let _ = triggers.try_send(Trigger::Manual);
                    }
                    KeyAction::Dismiss => {
                        let _ = triggers.try_send(Trigger::DismissNotices);
                    }
                    KeyAction::OpenSelected => {
                        let url = table.selected().and_then(|i| {
                            state.snapshot.as_ref()?.records.get(i).map(|r| r.url.clone())
                        });
                        if let Some(url) = url
                            && let Err(e) = opener.open(&url)
                        {
                            let _ = triggers
                                .try_send(Trigger::Notice(NoticeLevel::Error, format!("{e:#}")));
                        }
                    }
                }
            }
        }
    }
}
