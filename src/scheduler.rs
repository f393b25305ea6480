//! Periodic and on-demand refresh driving.
//!
//! The scheduler owns a single [`DashboardState`] published through a
//! `watch` channel. A refresh runs in its own task; while it is in flight,
//! timer ticks and manual triggers are dropped rather than queued.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::{
    sync::{mpsc, watch},
    task::{JoinError, JoinHandle},
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{error::GatherError, types::Snapshot};

/// Most recent notices kept for display.
pub const MAX_NOTICES: usize = 20;

/// Something that can produce a full snapshot on demand.
#[async_trait]
pub trait SnapshotSource: Send + Sync + 'static {
    async fn gather(&self) -> Result<Snapshot, GatherError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPhase {
    #[default]
    Idle,
    Fetching,
}

/// Requests sent to a running scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Refresh now unless a refresh is already in flight.
    Manual,
    DismissNotices,
    Notice(NoticeLevel, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Everything the renderer needs to draw a frame.
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    /// Last successfully gathered snapshot, kept across failed refreshes.
    pub snapshot: Option<Arc<Snapshot>>,
    pub phase: RefreshPhase,
    pub notices: Vec<Notice>,
    /// Set while the displayed snapshot is older than the last attempt.
    pub stale: Option<String>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub fetch_count: u64,
    /// Failures seen by the previous refresh; repeats are not re-announced.
    reported: BTreeSet<String>,
}

impl DashboardState {
    fn push_notice(&mut self, level: NoticeLevel, message: String) {
        self.notices.push(Notice {
            level,
            message,
            at: Utc::now(),
        });
        if self.notices.len() > MAX_NOTICES {
            let excess = self.notices.len() - MAX_NOTICES;
            self.notices.drain(..excess);
        }
    }

    /// Announces failures that were not already present in the previous refresh.
    fn report_failures(&mut self, level: NoticeLevel, failures: BTreeSet<String>) {
        let fresh: Vec<String> = failures.difference(&self.reported).cloned().collect();
        for message in fresh {
            self.push_notice(level, message);
        }
        self.reported = failures;
    }
}

type FetchHandle = JoinHandle<Result<Snapshot, GatherError>>;

pub struct Scheduler<S: ?Sized> {
    source: Arc<S>,
    interval: Duration,
    state: watch::Sender<DashboardState>,
}

impl<S: SnapshotSource + ?Sized> Scheduler<S> {
    pub fn new(source: Arc<S>, interval: Duration) -> (Self, watch::Receiver<DashboardState>) {
        let (state, rx) = watch::channel(DashboardState::default());
        (
            Self {
                source,
                interval,
                state,
            },
            rx,
        )
    }

    /// Queues a notice for display, e.g. start-up configuration warnings.
    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        self.state
            .send_modify(|state| state.push_notice(level, message));
    }

    /// Drives refreshes until `cancel` fires or every trigger sender is gone.
    ///
    /// The first refresh starts immediately.
    pub async fn run(self, mut triggers: mpsc::Receiver<Trigger>, cancel: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut in_flight: Option<FetchHandle> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.start_fetch(&mut in_flight, "timer"),
                trigger = triggers.recv() => match trigger {
                    Some(Trigger::Manual) => self.start_fetch(&mut in_flight, "manual"),
                    Some(Trigger::DismissNotices) => {
                        self.state.send_modify(|state| state.notices.clear());
                    }
                    Some(Trigger::Notice(level, message)) => self.notify(level, message),
                    None => break,
                },
                result = join_in_flight(&mut in_flight) => {
                    in_flight = None;
                    self.finish_fetch(result);
                }
            }
        }

        if let Some(handle) = in_flight {
            handle.abort();
        }
        debug!("scheduler stopped");
    }

    fn start_fetch(&self, in_flight: &mut Option<FetchHandle>, cause: &str) {
        if in_flight.is_some() {
            debug!(cause, "refresh already in progress, trigger dropped");
            return;
        }

        self.state.send_modify(|state| {
            state.phase = RefreshPhase::Fetching;
            state.last_attempt = Some(Utc::now());
            state.fetch_count += 1;
        });
        debug!(cause, "refresh started");

        let source = Arc::clone(&self.source);
        *in_flight = Some(tokio::spawn(async move { source.gather().await }));
    }

    fn finish_fetch(&self, result: Result<Result<Snapshot, GatherError>, JoinError>) {
        match result {
            Ok(Ok(snapshot)) => {
                info!(
                    count = snapshot.records.len(),
                    failed = snapshot.partial_failures.len(),
                    "refresh complete"
                );
                self.state.send_modify(|state| {
                    state.phase = RefreshPhase::Idle;
                    state.stale = None;
                    let failures = snapshot
                        .partial_failures
                        .iter()
                        .map(|f| f.to_string())
                        .collect();
                    state.report_failures(NoticeLevel::Warning, failures);
                    state.snapshot = Some(Arc::new(snapshot));
                });
            }
            Ok(Err(e)) => self.keep_last_good(e.to_string()),
            Err(e) => self.keep_last_good(format!("refresh task aborted: {}", e)),
        }
    }

    fn keep_last_good(&self, error: String) {
        warn!(error = %error, "refresh failed");
        self.state.send_modify(|state| {
            state.phase = RefreshPhase::Idle;
            state.stale = Some(format!("Refresh failed, showing last good data: {}", error));
            state.report_failures(NoticeLevel::Error, BTreeSet::from([error]));
        });
    }
}

async fn join_in_flight(
    handle: &mut Option<FetchHandle>,
) -> Result<Result<Snapshot, GatherError>, JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
