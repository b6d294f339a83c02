//! Reload Scheduler
//!
//! Pure state machine behind the reload loop. It never touches a clock or a
//! socket: every input is an [`Event`], every side effect is a [`Command`]
//! that the runtime carries out.
//!
//! A cycle runs:
//! 1. IDLE/SCHEDULED - waiting for a start or the reload timer
//! 2. LOADING - trade pages arrive one at a time; outgoing trades load alongside
//! 3. AWAITING_BARRIER - all trade pages are in, outgoing trades are not
//! 4. AGGREGATING - both feeds are in and the runtime runs the poll
//! 5. back to SCHEDULED with the reload timer re-armed
//!
//! STOP leaves any state for STOPPED; a later START begins a fresh cycle. Each
//! entry into LOADING bumps the cycle generation so the runtime can drop
//! completions that belong to an older cycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::{AnalyticsEvent, Note, NoteLevel};
use crate::settings::{
    MIN_RELOAD_INTERVAL_SECS, MODAL_RETRY_DELAY, NEXT_PAGE_DELAY, PAGE_GROWTH_MIN_ROWS,
};

/// State of the reload loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    Idle,
    Loading { page: u32 },
    AwaitingBarrier,
    Aggregating,
    Scheduled,
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "IDLE"),
            SchedulerState::Loading { page } => write!(f, "LOADING(page {})", page),
            SchedulerState::AwaitingBarrier => write!(f, "AWAITING_BARRIER"),
            SchedulerState::Aggregating => write!(f, "AGGREGATING"),
            SchedulerState::Scheduled => write!(f, "SCHEDULED"),
            SchedulerState::Stopped => write!(f, "STOPPED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    TimerFired,
    TradePageLoaded { page: u32, rows: usize },
    OutgoingLoaded,
    CycleFinished,
    BarrierTimedOut,
    Stop,
}

/// What an armed timer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerReason {
    ModalRetry,
    NextReload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    FetchTradePage { page: u32, delay: Duration },
    FetchOutgoing,
    UseCachedOutgoing,
    /// Replaces any armed timer
    ArmTimer { delay: Duration, reason: TimerReason },
    CancelTimer,
    ArmBarrierTimeout { after: Duration },
    DisarmBarrierTimeout,
    RunCycle,
    Emit(AnalyticsEvent),
    ResetTriggers,
    Notify(Note),
}

/// Outside facts the machine needs for one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerContext {
    /// A blocking modal is open, reloading now would disturb the user
    pub modal_open: bool,
    /// The outgoing cache is stale or a refresh was forced
    pub outgoing_stale: bool,
    pub max_pages: u32,
    pub reload_interval: Duration,
    pub barrier_timeout: Duration,
}

impl Default for SchedulerContext {
    fn default() -> Self {
        Self {
            modal_open: false,
            outgoing_stale: true,
            max_pages: crate::settings::DEFAULT_MAX_PAGES,
            reload_interval: Duration::from_secs(crate::settings::DEFAULT_RELOAD_INTERVAL_SECS),
            barrier_timeout: Duration::from_secs(crate::settings::DEFAULT_BARRIER_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReloadScheduler {
    state: SchedulerState,
    running: bool,
    trades_complete: bool,
    outgoing_complete: bool,
    generation: u64,
}

impl Default for ReloadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Idle,
            running: false,
            trades_complete: false,
            outgoing_complete: false,
            generation: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Generation of the current (or last) cycle
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Page the machine is waiting for, if any
    pub fn current_page(&self) -> Option<u32> {
        match self.state {
            SchedulerState::Loading { page } => Some(page),
            _ => None,
        }
    }

    /// Feeds one event through the machine
    pub fn handle(&mut self, event: Event, ctx: &SchedulerContext) -> Vec<Command> {
        let can_start = matches!(self.state, SchedulerState::Idle | SchedulerState::Stopped);
        if !self.running && !(event == Event::Start && can_start) {
            debug!(?event, state = %self.state, "scheduler not running, event ignored");
            return Vec::new();
        }

        match event {
            Event::Start => {
                if self.running {
                    debug!("already running");
                    return Vec::new();
                }
                self.running = true;
                // A modal retry after a restart fires from Idle
                self.state = SchedulerState::Idle;
                self.begin_reload(ctx)
            }
            Event::TimerFired => match self.state {
                SchedulerState::Idle | SchedulerState::Scheduled => self.begin_reload(ctx),
                _ => {
                    debug!(state = %self.state, "timer fired mid-cycle, ignored");
                    Vec::new()
                }
            },
            Event::TradePageLoaded { page, rows } => self.on_trade_page(page, rows, ctx),
            Event::OutgoingLoaded => match self.state {
                SchedulerState::Loading { .. } | SchedulerState::AwaitingBarrier => {
                    self.outgoing_complete = true;
                    self.try_join()
                }
                _ => {
                    debug!(state = %self.state, "stale outgoing completion ignored");
                    Vec::new()
                }
            },
            Event::CycleFinished => {
                if self.state != SchedulerState::Aggregating {
                    debug!(state = %self.state, "cycle finished outside aggregation, ignored");
                    return Vec::new();
                }
                self.schedule_next(ctx)
            }
            Event::BarrierTimedOut => match self.state {
                SchedulerState::Loading { .. } | SchedulerState::AwaitingBarrier => {
                    warn!(
                        generation = self.generation,
                        trades_complete = self.trades_complete,
                        outgoing_complete = self.outgoing_complete,
                        "reload timed out waiting for feeds"
                    );
                    let mut commands = vec![Command::Notify(Note::new(
                        "Reload timed out waiting for trade data",
                        NoteLevel::Warning,
                    ))];
                    commands.extend(self.schedule_next(ctx));
                    commands
                }
                _ => Vec::new(),
            },
            Event::Stop => {
                info!(state = %self.state, "stopping reload loop");
                self.running = false;
                self.state = SchedulerState::Stopped;
                vec![
                    Command::CancelTimer,
                    Command::DisarmBarrierTimeout,
                    Command::Notify(Note::new("Reload stopped", NoteLevel::Warning)),
                ]
            }
        }
    }

    /// Starts a cycle, or retries shortly if a modal is open
    fn begin_reload(&mut self, ctx: &SchedulerContext) -> Vec<Command> {
        if ctx.modal_open {
            debug!("stalling reload, modal open");
            return vec![Command::ArmTimer {
                delay: MODAL_RETRY_DELAY,
                reason: TimerReason::ModalRetry,
            }];
        }

        self.generation += 1;
        self.state = SchedulerState::Loading { page: 1 };
        self.trades_complete = false;
        self.outgoing_complete = false;
        debug!(generation = self.generation, "reloading trade data");

        let mut commands = vec![
            Command::CancelTimer,
            Command::ResetTriggers,
            Command::Notify(Note::new("Reload started", NoteLevel::Success)),
            Command::FetchTradePage {
                page: 1,
                delay: Duration::ZERO,
            },
        ];
        if ctx.outgoing_stale {
            commands.push(Command::FetchOutgoing);
        } else {
            self.outgoing_complete = true;
            commands.push(Command::UseCachedOutgoing);
        }
        commands.push(Command::ArmBarrierTimeout {
            after: ctx.barrier_timeout,
        });
        commands.push(Command::Emit(AnalyticsEvent::Reload));
        commands
    }

    fn on_trade_page(&mut self, page: u32, rows: usize, ctx: &SchedulerContext) -> Vec<Command> {
        let SchedulerState::Loading { page: current } = self.state else {
            debug!(page, state = %self.state, "stale trade page ignored");
            return Vec::new();
        };
        if page != current {
            debug!(page, current, "trade page for another page ignored");
            return Vec::new();
        }

        debug!(page, rows, "loaded trades");
        if rows >= PAGE_GROWTH_MIN_ROWS && page < ctx.max_pages {
            let next = page + 1;
            self.state = SchedulerState::Loading { page: next };
            return vec![
                Command::Notify(Note::new(
                    format!("Loading page {} of trades...", next),
                    NoteLevel::Success,
                )),
                Command::FetchTradePage {
                    page: next,
                    delay: NEXT_PAGE_DELAY,
                },
            ];
        }

        self.trades_complete = true;
        self.state = SchedulerState::AwaitingBarrier;
        self.try_join()
    }

    /// Runs the cycle once both feeds are in
    fn try_join(&mut self) -> Vec<Command> {
        if self.state == SchedulerState::AwaitingBarrier && self.trades_complete && self.outgoing_complete {
            self.state = SchedulerState::Aggregating;
            return vec![Command::DisarmBarrierTimeout, Command::RunCycle];
        }
        Vec::new()
    }

    fn schedule_next(&mut self, ctx: &SchedulerContext) -> Vec<Command> {
        self.state = SchedulerState::Scheduled;
        let delay = ctx
            .reload_interval
            .max(Duration::from_secs(MIN_RELOAD_INTERVAL_SECS));
        debug!(delay_secs = delay.as_secs(), "reload queued");
        vec![
            Command::DisarmBarrierTimeout,
            Command::CancelTimer,
            Command::ArmTimer {
                delay,
                reason: TimerReason::NextReload,
            },
        ]
    }
}
