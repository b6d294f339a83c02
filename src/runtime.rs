//! Monitor runtime
//!
//! Async driver around the [`ReloadScheduler`]. One task owns the session and
//! the state machine. Feed fetches run as spawned tasks and report back over a
//! channel tagged with the cycle generation, so late completions from an older
//! cycle are dropped. There is at most one reload timer and one barrier timer;
//! re-arming replaces the old one.
//!
//! Stopping only halts the reload loop. The task stays up, keeps the session,
//! and can be started again until it is shut down or every handle is dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio::time::{Instant, Sleep};
use tracing::{debug, info, warn};

use crate::aggregator::aggregate_outgoing;
use crate::config::reloadable::ReloadableSettings;
use crate::error::{MonitorError, Result};
use crate::models::{AnalyticsEvent, Note, NoteLevel, OutgoingRow, TradeRecord};
use crate::poll::{PollReport, run_cycle};
use crate::scheduler::{Command, Event, ReloadScheduler, SchedulerContext};
use crate::session::{Session, SessionStats};

// ============================================================================
// Collaborator traits
// ============================================================================

/// Supplies already-parsed records for one poll
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Offers on page `page` (1-based) of the trade stream
    async fn fetch_trade_page(&self, page: u32) -> Result<Vec<TradeRecord>>;

    /// Raw unshipped outbound trade rows
    async fn fetch_outgoing(&self) -> Result<Vec<OutgoingRow>>;
}

/// Reports whether a blocking modal is open
pub trait BlockingSignal: Send + Sync {
    fn is_blocking(&self) -> bool;
}

/// Receives poll results and status notes
pub trait DisplaySink: Send + Sync {
    fn render(&self, report: &PollReport);
    fn note(&self, note: &Note);
}

pub trait AnalyticsSink: Send + Sync {
    fn emit(&self, event: AnalyticsEvent);
}

/// Never blocks
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverBlocking;

impl BlockingSignal for NeverBlocking {
    fn is_blocking(&self) -> bool {
        false
    }
}

/// Writes reports and notes to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDisplay;

impl DisplaySink for LogDisplay {
    fn render(&self, report: &PollReport) {
        for alert in &report.alerts {
            let marker = if alert.show_new_marker { "NEW " } else { "" };
            info!("{}[{}] {}", marker, alert.value, alert.message);
        }
        if let Some(title) = &report.effects.set_title {
            info!("{}", title);
        }
        info!(
            "Total: {} ({} alerts, {} filtered)",
            report.visible_count,
            report.alerts.len(),
            report.filtered_count
        );
    }

    fn note(&self, note: &Note) {
        match note.level {
            NoteLevel::Warning => warn!("{}", note.text),
            NoteLevel::Muted => debug!("{}", note.text),
            NoteLevel::Info | NoteLevel::Success => info!("{}", note.text),
        }
    }
}

/// Logs analytics events at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAnalytics;

impl AnalyticsSink for LogAnalytics {
    fn emit(&self, event: AnalyticsEvent) {
        debug!(%event, "analytics");
    }
}

// ============================================================================
// Shared status
// ============================================================================

/// Latest monitor state, shared with the status API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub state: String,
    pub generation: u64,
    pub stats: SessionStats,
    pub last_report: Option<PollReport>,
}

pub type StatusBoard = Arc<RwLock<MonitorStatus>>;

// ============================================================================
// Handle
// ============================================================================

#[derive(Debug)]
enum Control {
    Start,
    Stop,
    Shutdown,
    SentTrade(String),
    ResetSession,
}

/// Cloneable handle for controlling a running monitor
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    tx: mpsc::UnboundedSender<Control>,
}

impl MonitorHandle {
    /// Restarts the reload loop after a stop. Ignored while it is running.
    pub fn start(&self) -> Result<()> {
        self.send(Control::Start)
    }

    /// Halts the reload loop. In-flight fetches are not cancelled; their results are dropped.
    pub fn stop(&self) -> Result<()> {
        self.send(Control::Stop)
    }

    /// Stops the reload loop if needed and ends [`Monitor::run`]
    pub fn shutdown(&self) -> Result<()> {
        self.send(Control::Shutdown)
    }

    /// Reports that the user committed to send the card behind `trade_id`
    pub fn record_sent_trade(&self, trade_id: impl Into<String>) -> Result<()> {
        self.send(Control::SentTrade(trade_id.into()))
    }

    /// Clears the session's alert history and totals
    pub fn reset_session(&self) -> Result<()> {
        self.send(Control::ResetSession)
    }

    fn send(&self, control: Control) -> Result<()> {
        self.tx.send(control).map_err(|_| MonitorError::ChannelClosed)
    }
}

// ============================================================================
// Monitor
// ============================================================================

#[derive(Debug)]
enum Completion {
    TradePage {
        generation: u64,
        page: u32,
        result: Result<Vec<TradeRecord>>,
    },
    Outgoing {
        generation: u64,
        result: Result<Vec<OutgoingRow>>,
    },
}

pub struct Monitor {
    source: Arc<dyn RecordSource>,
    blocking: Box<dyn BlockingSignal>,
    display: Box<dyn DisplaySink>,
    analytics: Box<dyn AnalyticsSink>,
    settings: ReloadableSettings,
    status: StatusBoard,
    session: Session,
    scheduler: ReloadScheduler,
    once: bool,
    shutdown: bool,
    controls_open: bool,
    pending_trades: Vec<TradeRecord>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
    reload_timer: Option<Pin<Box<Sleep>>>,
    barrier_timer: Option<Pin<Box<Sleep>>>,
}

impl Monitor {
    /// Creates a monitor with log-backed sinks and no blocking signal
    pub fn new(source: Arc<dyn RecordSource>, settings: ReloadableSettings) -> (Self, MonitorHandle) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let monitor = Self {
            source,
            blocking: Box::new(NeverBlocking),
            display: Box::new(LogDisplay),
            analytics: Box::new(LogAnalytics),
            settings,
            status: StatusBoard::default(),
            session: Session::new(Default::default()),
            scheduler: ReloadScheduler::new(),
            once: false,
            shutdown: false,
            controls_open: true,
            pending_trades: Vec::new(),
            control_rx,
            done_tx,
            done_rx,
            reload_timer: None,
            barrier_timer: None,
        };
        (monitor, MonitorHandle { tx: control_tx })
    }

    pub fn with_blocking(mut self, blocking: Box<dyn BlockingSignal>) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn with_display(mut self, display: Box<dyn DisplaySink>) -> Self {
        self.display = display;
        self
    }

    pub fn with_analytics(mut self, analytics: Box<dyn AnalyticsSink>) -> Self {
        self.analytics = analytics;
        self
    }

    /// Publishes status to an existing board instead of a private one
    pub fn with_status(mut self, status: StatusBoard) -> Self {
        self.status = status;
        self
    }

    /// Stops after the first cycle completes or fails
    pub fn once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    pub fn status(&self) -> StatusBoard {
        Arc::clone(&self.status)
    }

    /// Runs until shut down and returns the session totals.
    /// A stopped monitor waits for [`MonitorHandle::start`]; once every handle
    /// is dropped it returns as soon as the loop stops.
    pub async fn run(mut self) -> SessionStats {
        self.session.set_settings(self.settings.snapshot().await);
        info!(
            interval_secs = self.session.settings().reload_interval,
            max_pages = self.session.settings().max_pages,
            once = self.once,
            "monitor starting"
        );

        self.dispatch(Event::Start).await;

        while !self.shutdown && (self.scheduler.is_running() || self.controls_open) {
            tokio::select! {
                control = self.control_rx.recv(), if self.controls_open => match control {
                    Some(control) => self.on_control(control).await,
                    None => {
                        debug!("all monitor handles dropped");
                        self.controls_open = false;
                    }
                },
                Some(done) = self.done_rx.recv() => self.on_completion(done).await,
                _ = expire(&mut self.reload_timer) => {
                    self.reload_timer = None;
                    self.dispatch(Event::TimerFired).await;
                }
                _ = expire(&mut self.barrier_timer) => {
                    self.barrier_timer = None;
                    self.dispatch(Event::BarrierTimedOut).await;
                }
            }
        }

        let stats = self.session.stats();
        info!(
            polls = stats.polls,
            sent_trades = stats.sent_trades,
            alerted_points = stats.alerted_points,
            "monitor stopped"
        );
        stats
    }

    async fn on_control(&mut self, control: Control) {
        match control {
            Control::Start => self.dispatch(Event::Start).await,
            Control::Stop => self.dispatch(Event::Stop).await,
            Control::Shutdown => {
                if self.scheduler.is_running() {
                    self.dispatch(Event::Stop).await;
                }
                self.shutdown = true;
            }
            Control::SentTrade(trade_id) => {
                let event = self.session.record_sent_trade(&trade_id);
                self.analytics.emit(event);
                self.publish_status().await;
            }
            Control::ResetSession => {
                self.session.reset();
                self.publish_status().await;
            }
        }
    }

    async fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::TradePage { generation, page, result } => {
                if generation != self.scheduler.generation() || self.scheduler.current_page() != Some(page) {
                    debug!(generation, page, "stale trade page dropped");
                    return;
                }
                match result {
                    Ok(rows) => {
                        let count = rows.len();
                        self.pending_trades.extend(rows);
                        self.dispatch(Event::TradePageLoaded { page, rows: count }).await;
                    }
                    Err(e) => {
                        warn!(page, error = %e, "trade page fetch failed, cycle will time out");
                    }
                }
            }
            Completion::Outgoing { generation, result } => {
                if generation != self.scheduler.generation() {
                    debug!(generation, "stale outgoing trades dropped");
                    return;
                }
                match result {
                    Ok(rows) => {
                        self.session.store_outgoing(aggregate_outgoing(rows), Instant::now());
                        self.dispatch(Event::OutgoingLoaded).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "outgoing trades fetch failed, cycle will time out");
                    }
                }
            }
        }
    }

    /// Feeds an event and every follow-up event through the scheduler
    async fn dispatch(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            if matches!(event, Event::Start | Event::TimerFired) {
                self.refresh_settings().await;
            }

            let ctx = self.context();
            let commands = self.scheduler.handle(event, &ctx);
            let stopping = event == Event::Stop && !commands.is_empty();
            for command in commands {
                self.execute(command, &mut queue).await;
            }
            if stopping {
                for line in self.session.summary_lines() {
                    self.display.note(&Note::new(line, NoteLevel::Info));
                }
            }

            if self.once && event == Event::BarrierTimedOut {
                queue.push_back(Event::Stop);
                self.shutdown = true;
            }
        }

        self.publish_status().await;
    }

    async fn execute(&mut self, command: Command, queue: &mut VecDeque<Event>) {
        match command {
            Command::FetchTradePage { page, delay } => {
                if page == 1 {
                    self.pending_trades.clear();
                }
                let source = Arc::clone(&self.source);
                let tx = self.done_tx.clone();
                let generation = self.scheduler.generation();
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let result = source.fetch_trade_page(page).await;
                    if tx.send(Completion::TradePage { generation, page, result }).is_err() {
                        debug!(page, "monitor gone, trade page discarded");
                    }
                });
            }
            Command::FetchOutgoing => {
                let source = Arc::clone(&self.source);
                let tx = self.done_tx.clone();
                let generation = self.scheduler.generation();
                tokio::spawn(async move {
                    let result = source.fetch_outgoing().await;
                    if tx.send(Completion::Outgoing { generation, result }).is_err() {
                        debug!("monitor gone, outgoing trades discarded");
                    }
                });
            }
            Command::UseCachedOutgoing => {
                debug!(members = self.session.state().outgoing.len(), "using cached outgoing trades");
            }
            Command::ArmTimer { delay, reason } => {
                debug!(?reason, delay_ms = delay.as_millis() as u64, "timer armed");
                self.reload_timer = Some(Box::pin(tokio::time::sleep(delay)));
            }
            Command::CancelTimer => self.reload_timer = None,
            Command::ArmBarrierTimeout { after } => {
                self.barrier_timer = Some(Box::pin(tokio::time::sleep(after)));
            }
            Command::DisarmBarrierTimeout => self.barrier_timer = None,
            Command::RunCycle => {
                let records = std::mem::take(&mut self.pending_trades);
                let report = run_cycle(&mut self.session, records);
                self.display.render(&report);
                for event in &report.analytics {
                    self.analytics.emit(*event);
                }
                self.status.write().await.last_report = Some(report);

                queue.push_back(Event::CycleFinished);
                if self.once {
                    queue.push_back(Event::Stop);
                    self.shutdown = true;
                }
            }
            Command::Emit(event) => self.analytics.emit(event),
            Command::ResetTriggers => self.session.reset_triggers(),
            Command::Notify(note) => self.display.note(&note),
        }
    }

    async fn refresh_settings(&mut self) {
        let latest = self.settings.snapshot().await;
        if latest != *self.session.settings() {
            debug!(generation = self.settings.generation(), "settings changed, applying");
            self.session.set_settings(latest);
        }
    }

    fn context(&self) -> SchedulerContext {
        let settings = self.session.settings();
        SchedulerContext {
            modal_open: self.blocking.is_blocking(),
            outgoing_stale: self.session.outgoing_needs_refresh(Instant::now()),
            max_pages: settings.max_pages,
            reload_interval: settings.reload_interval(),
            barrier_timeout: settings.barrier_timeout(),
        }
    }

    async fn publish_status(&self) {
        let mut status = self.status.write().await;
        status.state = self.scheduler.state().to_string();
        status.generation = self.scheduler.generation();
        status.stats = self.session.stats();
    }
}

/// Resolves when the timer fires; never resolves when no timer is armed
async fn expire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
