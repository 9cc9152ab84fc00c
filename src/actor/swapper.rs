//! Runs the [`SwapEngine`] as a single-threaded actor.
//!
//! Requests are handled one at a time to completion. Between requests a
//! polling tick re-observes the active target while tracking is running.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, instrument, warn};

use crate::actor;
use crate::engine::{
    SwapEngine, SwapError, SwapKind, SwapOutcome, SwapRequest, TargetReport, TrackingUpdate,
};
use crate::model::SwapMode;
use crate::sys::System;
use crate::sys::geometry::Point;
use crate::sys::window_server::WindowServerId;
use crate::window::WindowSummary;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum Request {
    RegisterTargetAt { point: Point },
    RegisterTarget { window: WindowServerId },
    SwapAt { point: Point },
    SwapWith { window: WindowServerId },
    SwapWithIndex { index: usize },
    CycleSwitcher,
    CommitSwitcher,
    SetSwapMode { mode: SwapMode },
    ToggleSwapMode,
    /// The highlight overlay window, ignored when checking coverage.
    SetOverlayWindow { window: Option<WindowServerId> },
    Unregister,
    Terminate,
}

impl Request {
    fn mutates_windows(&self) -> bool {
        matches!(
            self,
            Request::SwapAt { .. }
                | Request::SwapWith { .. }
                | Request::SwapWithIndex { .. }
                | Request::CommitSwitcher
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum Event {
    TargetChanged(TargetReport),
    TargetCleared,
    SwitcherCandidate { index: usize, window: WindowSummary },
    SwapCompleted { kind: SwapKind, target: TargetReport },
    SwapFailed { reason: String },
}

impl From<TrackingUpdate> for Event {
    fn from(update: TrackingUpdate) -> Self {
        match update {
            TrackingUpdate::Changed(report) => Event::TargetChanged(report),
            TrackingUpdate::Cleared => Event::TargetCleared,
        }
    }
}

pub type Sender = actor::Sender<Request>;
pub type Receiver = actor::Receiver<Request>;
pub type EventSender = actor::Sender<Event>;
pub type EventReceiver = actor::Receiver<Event>;

pub struct Swapper<S: System> {
    engine: SwapEngine<S>,
    events_tx: EventSender,
    poll_interval: Duration,
}

impl<S: System> Swapper<S> {
    pub fn new(engine: SwapEngine<S>, events_tx: EventSender, poll_interval: Duration) -> Self {
        Swapper {
            engine,
            events_tx,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn engine(&self) -> &SwapEngine<S> { &self.engine }

    pub async fn run(mut self, mut requests_rx: Receiver) {
        let mut tick = time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_request = requests_rx.recv() => {
                    let Some((span, request)) = maybe_request else { break };
                    let _guard = span.enter();
                    if request == Request::Terminate {
                        debug!("Swapper terminating");
                        break;
                    }
                    let mutates = request.mutates_windows();
                    self.handle_request(request);
                    if mutates {
                        // Give the windows a full period before the next read.
                        tick.reset();
                    }
                }
                _ = tick.tick() => self.on_tick(),
            }
        }
    }

    fn on_tick(&mut self) {
        if let Some(update) = self.engine.track() {
            self.events_tx.send(update.into());
        }
    }

    #[instrument(name = "swapper::handle_request", skip(self))]
    pub fn handle_request(&mut self, request: Request) {
        match request {
            Request::RegisterTargetAt { point } => {
                let result = self.engine.register_target_at(point);
                self.registered(result);
            }
            Request::RegisterTarget { window } => {
                let result = self.engine.register_window(window);
                self.registered(result);
            }
            Request::SwapAt { point } => self.swap(SwapRequest::At(point)),
            Request::SwapWith { window } => self.swap(SwapRequest::Window(window)),
            Request::SwapWithIndex { index } => self.swap(SwapRequest::Index(index)),
            Request::CycleSwitcher => match self.engine.cycle_switcher() {
                Ok((index, window)) => {
                    self.events_tx.send(Event::SwitcherCandidate { index, window })
                }
                Err(err) => self.failed(err),
            },
            Request::CommitSwitcher => {
                let result = self.engine.commit_switcher();
                self.swapped(result);
            }
            Request::SetSwapMode { mode } => {
                let update = self.engine.set_swap_mode(mode);
                self.updated(update);
            }
            Request::ToggleSwapMode => {
                let update = self.engine.toggle_swap_mode();
                self.updated(update);
            }
            Request::SetOverlayWindow { window } => {
                self.engine.set_overlay_window(window);
                let update = self.engine.refresh();
                self.updated(update);
            }
            Request::Unregister => match self.engine.unregister() {
                Ok(update) => self.updated(update),
                Err(err) => self.failed(err),
            },
            Request::Terminate => {}
        }
    }

    fn swap(&mut self, request: SwapRequest<S::Handle>) {
        let result = self.engine.handle_swap_request(request);
        self.swapped(result);
    }

    fn swapped(&mut self, result: Result<SwapOutcome, SwapError>) {
        match result {
            Ok(SwapOutcome::Swapped { kind, report }) => {
                self.events_tx.send(Event::SwapCompleted { kind, target: report })
            }
            Ok(SwapOutcome::Unchanged) => debug!("Nothing to swap"),
            Err(err) => {
                self.failed(err);
                // A failed swap may have dropped or replaced the target.
                let update = self.engine.refresh();
                self.updated(update);
            }
        }
    }

    fn registered(&mut self, result: Result<TargetReport, SwapError>) {
        match result {
            Ok(report) => self.events_tx.send(Event::TargetChanged(report)),
            Err(err) => self.failed(err),
        }
    }

    fn updated(&self, update: Option<TrackingUpdate>) {
        if let Some(update) = update {
            self.events_tx.send(update.into());
        }
    }

    fn failed(&self, err: SwapError) {
        warn!(%err, "Request failed");
        self.events_tx.send(Event::SwapFailed { reason: err.to_string() });
    }
}
