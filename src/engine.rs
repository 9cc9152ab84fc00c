//! The swap and rotation state machine.
//!
//! [`SwapEngine`] owns every target slot and decides, for each swap request,
//! between a toggle with the last partner, a first simple swap, or a rotation
//! along the slot's swap chain. All window access goes through a [`Context`]
//! built once at startup.

pub mod rotation;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use self::rotation::{Move, Plan, Rotation, plan_simple};
use crate::common::config::Config;
use crate::model::{SwapMode, TargetSlot, TargetState, TargetStore};
use crate::sys::System;
use crate::sys::geometry::{Point, Rect};
use crate::sys::window_server::WindowServerId;
use crate::window::{
    FrameError, FrameMutator, IdentityResolver, Visibility, VisibilityClassifier,
    WindowDiscovery, WindowRecord, WindowSummary,
};

/// The engine's collaborators.
pub struct Context<S: System> {
    pub system: S,
    pub identity: IdentityResolver,
    pub mutator: FrameMutator,
    pub visibility: VisibilityClassifier,
    pub discovery: WindowDiscovery,
}

impl<S: System> Context<S> {
    pub fn new(system: S, config: &Config) -> Self {
        let t = &config.tuning;
        let ignored_pid = config.settings.exclude_own_windows.then(|| system.own_pid());
        Context {
            identity: IdentityResolver::new(t.identity_frame_tolerance, t.max_ancestor_depth),
            mutator: FrameMutator::new(
                t.mutation_tolerance,
                t.size_skip_threshold,
                Duration::from_millis(t.settle_delay_ms),
                t.max_mutation_attempts,
            ),
            visibility: VisibilityClassifier::new(
                t.identity_frame_tolerance,
                t.coverage_area_ratio,
                t.min_window_dimension,
                t.visibility_min_alpha,
                t.system_layer_threshold,
            )
            .ignoring_pid(ignored_pid),
            discovery: WindowDiscovery::new(
                t.discovery_frame_tolerance,
                t.min_window_dimension,
                t.discovery_min_alpha,
            ),
            system,
        }
    }

    pub fn frame_of(&self, handle: &S::Handle) -> Option<Rect> {
        self.identity.frame_of(&self.system, handle)
    }

    pub fn resolve(&self, handle: &S::Handle) -> Option<WindowServerId> {
        self.identity.resolve(&self.system, handle)
    }

    pub fn classify(&self, handle: &S::Handle, exclude: Option<WindowServerId>) -> Visibility {
        self.visibility.classify(&self.system, &self.identity, handle, exclude)
    }

    pub fn windows(&self) -> Vec<WindowRecord<S::Handle>> {
        self.discovery.list_eligible_windows(&self.system, &self.identity)
    }

    pub fn window_under_point(&self, point: Point) -> Option<S::Handle> {
        self.identity.window_under_point(&self.system, point)
    }

    pub fn set_frame(&self, handle: &S::Handle, frame: Rect) -> Result<Rect, FrameError> {
        self.mutator.set_frame(&self.system, handle, frame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SwapError {
    #[error("no target is registered")]
    NoTarget,
    #[error("the target window is gone")]
    TargetGone,
    #[error("the window to swap with is gone")]
    WindowGone,
    #[error("no window at that location")]
    NoWindow,
}

/// Periodic frame tracking of the active target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Tracking {
    Stopped,
    Running,
    /// Suspended while a swap is mutating windows.
    Paused,
}

/// What the presentation layer needs to highlight the active target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub window: Option<WindowServerId>,
    pub frame: Rect,
    pub visibility: Visibility,
    pub swap_mode: SwapMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackingUpdate {
    Changed(TargetReport),
    Cleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SwapKind {
    /// First swap of a slot.
    Simple,
    /// The target was clicked again and swapped back with its partner.
    Toggle,
    Rotation,
    /// A rotation whose chain had no home for the current target.
    DegradedRotation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwapOutcome {
    Swapped { kind: SwapKind, report: TargetReport },
    Unchanged,
}

/// How a swap request names the other window.
#[derive(Debug, Clone, PartialEq)]
pub enum SwapRequest<H> {
    At(Point),
    Handle(H),
    Window(WindowServerId),
    /// Index into the current switcher candidates.
    Index(usize),
}

pub struct SwapEngine<S: System> {
    cx: Context<S>,
    targets: TargetStore<S::Handle>,
    tracking: Tracking,
    default_mode: SwapMode,
    /// The highlight overlay, ignored by coverage checks.
    overlay: Option<WindowServerId>,
    /// Last switcher selection.
    switcher: Option<WindowServerId>,
    last_update: Option<TrackingUpdate>,
}

impl<S: System> SwapEngine<S> {
    pub fn new(cx: Context<S>, default_mode: SwapMode) -> Self {
        Self {
            cx,
            targets: TargetStore::new(),
            tracking: Tracking::Stopped,
            default_mode,
            overlay: None,
            switcher: None,
            last_update: Some(TrackingUpdate::Cleared),
        }
    }

    pub fn context(&self) -> &Context<S> { &self.cx }

    pub fn targets(&self) -> &TargetStore<S::Handle> { &self.targets }

    pub fn tracking(&self) -> Tracking { self.tracking }

    pub fn default_mode(&self) -> SwapMode { self.default_mode }

    pub fn active_target(&self) -> Option<&S::Handle> {
        self.targets.active_state().map(|state| &state.element)
    }

    pub fn set_overlay_window(&mut self, overlay: Option<WindowServerId>) {
        self.overlay = overlay;
    }

    #[instrument(skip(self))]
    pub fn register_target(&mut self, handle: S::Handle) -> Result<TargetReport, SwapError> {
        let frame = self.cx.frame_of(&handle).ok_or(SwapError::WindowGone)?;
        let id = self.cx.resolve(&handle);
        if id.is_none() {
            warn!(?handle, "Registering a target without a window id");
        }
        let slot = self.targets.insert(id, TargetState::new(handle, frame, self.default_mode));
        self.tracking = Tracking::Running;
        self.switcher = None;
        info!(?id, ?frame, "Registered target");
        Ok(self.publish(slot, frame))
    }

    pub fn register_target_at(&mut self, point: Point) -> Result<TargetReport, SwapError> {
        let handle = self.cx.window_under_point(point).ok_or(SwapError::NoWindow)?;
        self.register_target(handle)
    }

    pub fn register_window(&mut self, id: WindowServerId) -> Result<TargetReport, SwapError> {
        let record = self.find_window(id)?;
        self.register_target(record.handle)
    }

    /// Swaps the active target with the window named by `request`.
    #[instrument(skip(self))]
    pub fn handle_swap_request(
        &mut self,
        request: SwapRequest<S::Handle>,
    ) -> Result<SwapOutcome, SwapError> {
        let slot = self.ensure_active()?;
        let Some(target) = self.targets.get(slot).map(|state| state.element.clone()) else {
            return Err(SwapError::NoTarget);
        };
        let Some(target_frame) = self.cx.frame_of(&target) else {
            warn!(?target, "Target is gone; unregistering it");
            self.drop_target(slot);
            return Err(SwapError::TargetGone);
        };
        let clicked = match request {
            SwapRequest::At(point) => {
                self.cx.window_under_point(point).ok_or(SwapError::NoWindow)?
            }
            SwapRequest::Handle(handle) => handle,
            SwapRequest::Window(id) => self.find_window(id)?.handle,
            SwapRequest::Index(index) => {
                self.candidates().into_iter().nth(index).ok_or(SwapError::NoWindow)?.handle
            }
        };
        self.swap_with(slot, target, target_frame, clicked)
    }

    fn swap_with(
        &mut self,
        slot: TargetSlot,
        target: S::Handle,
        target_frame: Rect,
        clicked: S::Handle,
    ) -> Result<SwapOutcome, SwapError> {
        let state = self.targets.get(slot).ok_or(SwapError::NoTarget)?;
        let mode = state.swap_mode;

        if clicked == target {
            let Some(partner) = state.last_swapped_partner.clone() else {
                debug!("Target clicked with no partner to swap back");
                return Ok(SwapOutcome::Unchanged);
            };
            let Some(partner_frame) = self.cx.frame_of(&partner) else {
                if let Some(state) = self.targets.get_mut(slot) {
                    state.last_swapped_partner = None;
                }
                return Err(SwapError::WindowGone);
            };
            let moves = plan_simple(mode, &target, target_frame, &partner, partner_frame);
            return self.execute(slot, SwapKind::Toggle, &moves, |state| state.hand_over(partner));
        }

        let clicked_frame = self.cx.frame_of(&clicked).ok_or(SwapError::WindowGone)?;

        if state.swap_chain.is_empty() {
            let moves = plan_simple(mode, &target, target_frame, &clicked, clicked_frame);
            return self.execute(slot, SwapKind::Simple, &moves, |state| {
                state.seed_chain(clicked.clone(), clicked_frame);
                state.hand_over(clicked);
            });
        }

        let original = state.original_target_element.clone();
        let rotation = Rotation {
            original_current: if original == target {
                Some(target_frame)
            } else {
                self.cx.frame_of(&original)
            },
            original,
            original_frame: state.original_target_frame,
            current_home: state.original_frame_of(&target),
            current: target,
            current_frame: target_frame,
            incoming: clicked.clone(),
            incoming_frame: clicked_frame,
        };
        let plan = rotation.plan(mode);
        let kind = match plan {
            Plan::Rotation(_) => SwapKind::Rotation,
            Plan::Degraded(_) => {
                warn!(
                    current = ?rotation.current,
                    "No recorded original frame for the current target; swapping directly"
                );
                SwapKind::DegradedRotation
            }
        };
        self.execute(slot, kind, plan.moves(), |state| {
            state.record_entry(clicked.clone(), clicked_frame);
            state.hand_over(clicked);
        })
    }

    /// Applies `moves` with tracking paused, then commits the state change
    /// and rebuilds the id index.
    fn execute(
        &mut self,
        slot: TargetSlot,
        kind: SwapKind,
        moves: &[Move<S::Handle>],
        commit: impl FnOnce(&mut TargetState<S::Handle>),
    ) -> Result<SwapOutcome, SwapError> {
        let resume = self.tracking;
        self.tracking = Tracking::Paused;

        let target = self.targets.get(slot).map(|state| state.element.clone());
        if let Err(err) = self.apply_moves(moves, target.as_ref()) {
            self.tracking = if resume == Tracking::Paused { Tracking::Running } else { resume };
            if err == SwapError::TargetGone {
                self.drop_target(slot);
            }
            return Err(err);
        }

        if let Some(state) = self.targets.get_mut(slot) {
            commit(state);
        }
        let cx = &self.cx;
        self.targets.reindex(|handle| cx.resolve(handle));
        self.targets.touch(slot);
        self.targets.set_active(Some(slot));
        self.tracking = Tracking::Running;

        let Some(element) = self.targets.get(slot).map(|state| state.element.clone()) else {
            return Err(SwapError::NoTarget);
        };
        let frame = self
            .cx
            .frame_of(&element)
            .or_else(|| moves.iter().find(|m| m.handle == element).map(|m| m.to))
            .unwrap_or_default();
        let report = self.publish(slot, frame);
        info!(%kind, window = ?report.window, "Swapped");
        Ok(SwapOutcome::Swapped { kind, report })
    }

    /// Mutates windows in order. A required window vanishing rolls back the
    /// moves already made.
    fn apply_moves(
        &self,
        moves: &[Move<S::Handle>],
        target: Option<&S::Handle>,
    ) -> Result<(), SwapError> {
        let mut applied: Vec<&Move<S::Handle>> = Vec::with_capacity(moves.len());
        for m in moves {
            match self.cx.set_frame(&m.handle, m.to) {
                Ok(landed) => {
                    if !landed.same_as_within(&m.to, self.cx.mutator.tolerance()) {
                        debug!(handle = ?m.handle, ?landed, wanted = ?m.to, "Window clamped");
                    }
                    applied.push(m);
                }
                Err(FrameError::Gone) if !m.required => {
                    debug!(handle = ?m.handle, "Skipping window that is gone");
                }
                Err(FrameError::Gone) => {
                    warn!(handle = ?m.handle, "Window gone mid-swap; rolling back");
                    for done in applied.iter().rev() {
                        if let Err(err) = self.cx.set_frame(&done.handle, done.from) {
                            debug!(handle = ?done.handle, %err, "Rollback failed");
                        }
                    }
                    return Err(if Some(&m.handle) == target {
                        SwapError::TargetGone
                    } else {
                        SwapError::WindowGone
                    });
                }
            }
        }
        Ok(())
    }

    /// Polling tick. Reports only when something changed since the last
    /// report.
    pub fn track(&mut self) -> Option<TrackingUpdate> {
        if self.tracking != Tracking::Running {
            return None;
        }
        self.refresh()
    }

    /// Re-observes the active target regardless of the tracking state.
    pub fn refresh(&mut self) -> Option<TrackingUpdate> {
        let update = self.observe();
        if self.last_update.as_ref() == Some(&update) {
            return None;
        }
        self.last_update = Some(update.clone());
        Some(update)
    }

    fn observe(&mut self) -> TrackingUpdate {
        for _ in 0..=self.targets.len() {
            let Some(slot) = self.targets.active().or_else(|| self.failover(None)) else {
                break;
            };
            let Some(element) = self.targets.get(slot).map(|state| state.element.clone()) else {
                break;
            };
            let Some(frame) = self.cx.frame_of(&element) else {
                warn!(?element, "Target window is gone");
                self.targets.remove(slot);
                continue;
            };
            let visibility = self.cx.classify(&element, self.overlay);
            if visibility == Visibility::NotOnScreen && self.failover(Some(slot)).is_some() {
                continue;
            }
            return TrackingUpdate::Changed(self.report_with(slot, frame, visibility));
        }
        debug!("No target left to track");
        self.tracking = Tracking::Stopped;
        TrackingUpdate::Cleared
    }

    /// Activates the most recently accessed stored target that is on screen,
    /// dropping dead ones on the way.
    fn failover(&mut self, exclude: Option<TargetSlot>) -> Option<TargetSlot> {
        let mut dead = Vec::new();
        let mut found = None;
        for slot in self.targets.by_recency() {
            if Some(slot) == exclude {
                continue;
            }
            let Some(state) = self.targets.get(slot) else { continue };
            if self.cx.frame_of(&state.element).is_none() {
                dead.push(slot);
                continue;
            }
            if self.cx.classify(&state.element, self.overlay) != Visibility::NotOnScreen {
                found = Some(slot);
                break;
            }
        }
        for slot in dead {
            debug!(?slot, "Dropping dead stored target");
            self.targets.remove(slot);
        }
        if let Some(slot) = found {
            info!(window = ?self.targets.window_of(slot), "Failing over to stored target");
            self.targets.set_active(Some(slot));
            self.targets.touch(slot);
            self.tracking = Tracking::Running;
        }
        found
    }

    fn ensure_active(&mut self) -> Result<TargetSlot, SwapError> {
        match self.targets.active() {
            Some(slot) => Ok(slot),
            None => self.failover(None).ok_or(SwapError::NoTarget),
        }
    }

    fn drop_target(&mut self, slot: TargetSlot) {
        self.targets.remove(slot);
        if self.failover(None).is_none() {
            self.tracking = Tracking::Stopped;
        }
    }

    fn report(&self, slot: TargetSlot, frame: Rect) -> TargetReport {
        let visibility = match self.targets.get(slot) {
            Some(state) => self.cx.classify(&state.element, self.overlay),
            None => Visibility::NotOnScreen,
        };
        self.report_with(slot, frame, visibility)
    }

    fn report_with(&self, slot: TargetSlot, frame: Rect, visibility: Visibility) -> TargetReport {
        TargetReport {
            window: self.targets.window_of(slot),
            frame,
            visibility,
            swap_mode: self.targets.get(slot).map_or(self.default_mode, |state| state.swap_mode),
        }
    }

    /// Builds a report and remembers it as the last one sent.
    fn publish(&mut self, slot: TargetSlot, frame: Rect) -> TargetReport {
        let report = self.report(slot, frame);
        self.last_update = Some(TrackingUpdate::Changed(report.clone()));
        report
    }

    fn find_window(&self, id: WindowServerId) -> Result<WindowRecord<S::Handle>, SwapError> {
        self.cx.windows().into_iter().find(|w| w.id == id).ok_or(SwapError::NoWindow)
    }

    /// Eligible windows other than the active target, front to back.
    pub fn candidates(&self) -> Vec<WindowRecord<S::Handle>> {
        let target = self.targets.active_state().map(|state| &state.element);
        let target_id = self.targets.active().and_then(|slot| self.targets.window_of(slot));
        self.cx
            .windows()
            .into_iter()
            .filter(|w| Some(w.id) != target_id && Some(&w.handle) != target)
            .collect()
    }

    /// Advances the switcher to the next candidate, wrapping around.
    pub fn cycle_switcher(&mut self) -> Result<(usize, WindowSummary), SwapError> {
        let candidates = self.candidates();
        if candidates.is_empty() {
            self.switcher = None;
            return Err(SwapError::NoWindow);
        }
        let index = self
            .switcher
            .and_then(|id| candidates.iter().position(|c| c.id == id))
            .map_or(0, |i| (i + 1) % candidates.len());
        self.switcher = Some(candidates[index].id);
        Ok((index, candidates[index].summary()))
    }

    /// Swaps with the current switcher selection.
    pub fn commit_switcher(&mut self) -> Result<SwapOutcome, SwapError> {
        let id = self.switcher.take().ok_or(SwapError::NoWindow)?;
        self.handle_swap_request(SwapRequest::Window(id))
    }

    pub fn set_swap_mode(&mut self, mode: SwapMode) -> Option<TrackingUpdate> {
        info!(%mode, "Swap mode changed");
        self.default_mode = mode;
        let slot = self.targets.active()?;
        if let Some(state) = self.targets.get_mut(slot) {
            state.swap_mode = mode;
        }
        self.refresh()
    }

    pub fn toggle_swap_mode(&mut self) -> Option<TrackingUpdate> {
        let mode = self.targets.active_state().map_or(self.default_mode, |state| state.swap_mode);
        self.set_swap_mode(mode.toggled())
    }

    pub fn unregister(&mut self) -> Result<Option<TrackingUpdate>, SwapError> {
        let slot = self.targets.active().ok_or(SwapError::NoTarget)?;
        self.targets.remove(slot);
        self.switcher = None;
        info!("Unregistered target");
        if self.failover(None).is_none() {
            self.tracking = Tracking::Stopped;
        }
        Ok(self.refresh())
    }
}
