//! Reliable frame changes over an accessibility API that clamps, reorders and
//! applies geometry asynchronously.
//!
//! A [`Mutation`] is a bounded state machine: it issues one geometry call per
//! [`Mutation::advance`], asks the caller to settle in between, verifies the
//! result and retries a limited number of times. [`FrameMutator::set_frame`]
//! drives it to completion using [`System::settle`] as the delay.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace};

use crate::sys::System;
use crate::sys::geometry::{Point, Rect};

/// Aggregate pixel error accepted as "arrived".
pub const MUTATION_TOLERANCE: f64 = 5.0;

/// Size changes smaller than this on both axes are not applied.
pub const SIZE_SKIP_THRESHOLD: f64 = 25.0;

pub const SETTLE_DELAY: Duration = Duration::from_millis(30);

pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("window is gone")]
    Gone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Position,
    Size,
}

/// Call ordering for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Move first so the new size is not clipped against a screen edge, then
    /// size twice.
    Grow,
    /// Shrink in place first, then move, then size again.
    Shrink,
    PositionOnly,
}

impl Direction {
    pub fn classify(current: &Rect, target: &Rect, size_skip_threshold: f64) -> Direction {
        let dw = target.size.width - current.size.width;
        let dh = target.size.height - current.size.height;
        if dw.abs() < size_skip_threshold && dh.abs() < size_skip_threshold {
            Direction::PositionOnly
        } else if dw > 0.0 || dh > 0.0 {
            Direction::Grow
        } else {
            Direction::Shrink
        }
    }

    fn steps(self) -> &'static [Step] {
        match self {
            Direction::Grow => &[Step::Position, Step::Size, Step::Size],
            Direction::Shrink => &[Step::Size, Step::Position, Step::Size],
            Direction::PositionOnly => &[Step::Position],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Apply { step: usize },
    Verify,
    Done(Rect),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// Wait this long, then call [`Mutation::advance`] again.
    Settle(Duration),
    /// Final observed frame. May differ from the requested one when the
    /// window enforces its own limits.
    Done(Rect),
}

#[derive(Debug, Clone)]
pub struct FrameMutator {
    tolerance: f64,
    size_skip_threshold: f64,
    settle_delay: Duration,
    max_attempts: u32,
}

impl Default for FrameMutator {
    fn default() -> Self {
        Self::new(MUTATION_TOLERANCE, SIZE_SKIP_THRESHOLD, SETTLE_DELAY, MAX_ATTEMPTS)
    }
}

impl FrameMutator {
    pub fn new(
        tolerance: f64,
        size_skip_threshold: f64,
        settle_delay: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            tolerance,
            size_skip_threshold,
            settle_delay,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn tolerance(&self) -> f64 { self.tolerance }

    /// Starts a mutation towards `target`. Fails only if the window's current
    /// frame cannot be read.
    pub fn begin<'a, S: System>(
        &self,
        system: &'a S,
        handle: &'a S::Handle,
        target: Rect,
    ) -> Result<Mutation<'a, S>, FrameError> {
        let current = system.frame(handle).map_err(|err| {
            debug!(?handle, %err, "Cannot read frame before mutating");
            FrameError::Gone
        })?;
        let direction = Direction::classify(&current, &target, self.size_skip_threshold);
        Ok(self.start(system, handle, current, target, direction))
    }

    fn start<'a, S: System>(
        &self,
        system: &'a S,
        handle: &'a S::Handle,
        current: Rect,
        target: Rect,
        direction: Direction,
    ) -> Mutation<'a, S> {
        let mut mutation = Mutation {
            system,
            handle,
            target,
            direction,
            size_matters: direction != Direction::PositionOnly,
            phase: Phase::Apply { step: 0 },
            attempt: 0,
            observed: current,
            settings: self.clone(),
        };
        if mutation.error(&current) <= self.tolerance {
            trace!(?handle, "Frame already in place");
            mutation.phase = Phase::Done(current);
        }
        mutation
    }

    /// Moves and resizes `handle` to `target`, returning the frame it
    /// actually ended up with.
    pub fn set_frame<S: System>(
        &self,
        system: &S,
        handle: &S::Handle,
        target: Rect,
    ) -> Result<Rect, FrameError> {
        let mutation = self.begin(system, handle, target)?;
        mutation.run()
    }

    /// Moves `handle` so its origin is `position`, leaving its size alone.
    pub fn set_position<S: System>(
        &self,
        system: &S,
        handle: &S::Handle,
        position: Point,
    ) -> Result<Rect, FrameError> {
        let current = system.frame(handle).map_err(|_| FrameError::Gone)?;
        let target = Rect::from_parts(position, current.size);
        self.start(system, handle, current, target, Direction::PositionOnly).run()
    }
}

/// One in-flight frame change. See the module docs.
pub struct Mutation<'a, S: System> {
    system: &'a S,
    handle: &'a S::Handle,
    target: Rect,
    direction: Direction,
    /// False when the size change was below the skip threshold; then only the
    /// position is applied and verified.
    size_matters: bool,
    phase: Phase,
    attempt: u32,
    /// Last frame read back from the window.
    observed: Rect,
    settings: FrameMutator,
}

impl<'a, S: System> Mutation<'a, S> {
    pub fn target(&self) -> Rect { self.target }

    pub fn direction(&self) -> Direction { self.direction }

    pub fn attempts(&self) -> u32 { self.attempt }

    fn error(&self, observed: &Rect) -> f64 {
        if self.size_matters {
            observed.aggregate_error(&self.target)
        } else {
            observed.position_error(&self.target)
        }
    }

    pub fn advance(&mut self) -> Result<Progress, FrameError> {
        loop {
            match self.phase {
                Phase::Done(frame) => return Ok(Progress::Done(frame)),
                Phase::Apply { step } => {
                    let steps = self.direction.steps();
                    self.apply(steps[step])?;
                    self.phase = if step + 1 < steps.len() {
                        Phase::Apply { step: step + 1 }
                    } else {
                        Phase::Verify
                    };
                    return Ok(Progress::Settle(self.settings.settle_delay));
                }
                Phase::Verify => self.verify()?,
            }
        }
    }

    /// Drives the mutation to completion, settling through the system.
    pub fn run(mut self) -> Result<Rect, FrameError> {
        loop {
            match self.advance()? {
                Progress::Settle(delay) => self.system.settle(delay),
                Progress::Done(frame) => return Ok(frame),
            }
        }
    }

    fn apply(&self, step: Step) -> Result<(), FrameError> {
        let result = match step {
            Step::Position => self.system.set_position(self.handle, self.target.origin),
            Step::Size => self.system.set_size(self.handle, self.target.size),
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.is_dead() => {
                debug!(handle = ?self.handle, ?step, "Window died while mutating");
                Err(FrameError::Gone)
            }
            Err(err) => {
                // Verification decides whether this mattered.
                trace!(handle = ?self.handle, ?step, %err, "Geometry call rejected");
                Ok(())
            }
        }
    }

    fn verify(&mut self) -> Result<(), FrameError> {
        let observed = match self.system.frame(self.handle) {
            Ok(frame) => frame,
            Err(err) if err.is_dead() => return Err(FrameError::Gone),
            Err(err) => {
                debug!(handle = ?self.handle, %err, last = ?self.observed, "Cannot read back frame");
                self.phase = Phase::Done(self.observed);
                return Ok(());
            }
        };
        self.attempt += 1;
        self.observed = observed;
        let error = self.error(&observed);
        if error <= self.settings.tolerance {
            self.phase = Phase::Done(observed);
            return Ok(());
        }

        if self.attempt >= self.settings.max_attempts {
            debug!(
                handle = ?self.handle,
                ?observed,
                target = ?self.target,
                attempts = self.attempt,
                "Accepting clamped frame"
            );
            self.phase = Phase::Done(observed);
            return Ok(());
        }

        trace!(handle = ?self.handle, error, attempt = self.attempt, "Retrying frame change");
        if self.size_matters {
            self.direction = Direction::classify(&observed, &self.target, 0.0);
        }
        self.phase = Phase::Apply { step: 0 };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;
    use crate::sys::geometry::Size;
    use crate::sys::testing::{Call, FakeSystem};

    fn setup(frame: Rect) -> (FakeSystem, crate::sys::testing::FakeHandle) {
        let sys = FakeSystem::new();
        sys.add_app(10, "Editor", true);
        let w = sys.add_window(10, frame);
        (sys, w)
    }

    #[test]
    fn grows_position_first_then_size_twice() {
        let (sys, w) = setup(Rect::new(900., 0., 100., 100.));
        sys.set_screen(Rect::new(0., 0., 1000., 800.));
        let target = Rect::new(0., 0., 500., 500.);

        let result = FrameMutator::default().set_frame(&sys, &w, target);

        assert_eq!(Ok(target), result);
        assert_eq!(
            vec![
                Call::Position(w, target.origin),
                Call::Size(w, target.size),
                Call::Size(w, target.size),
            ],
            sys.calls()
        );
        assert_eq!(vec![SETTLE_DELAY; 3], sys.settles());
    }

    #[test]
    fn shrinks_size_first() {
        let (sys, w) = setup(Rect::new(0., 0., 900., 700.));
        sys.set_screen(Rect::new(0., 0., 1000., 800.));
        let target = Rect::new(500., 400., 300., 300.);

        assert_eq!(Ok(target), FrameMutator::default().set_frame(&sys, &w, target));
        assert_eq!(
            vec![
                Call::Size(w, target.size),
                Call::Position(w, target.origin),
                Call::Size(w, target.size),
            ],
            sys.calls()
        );
    }

    #[test]
    fn second_size_call_compensates_for_a_dropped_one() {
        let (sys, w) = setup(Rect::new(0., 0., 300., 300.));
        sys.update(w, |w| w.drop_sizes = 1);
        let target = Rect::new(100., 100., 600., 500.);

        assert_eq!(Ok(target), FrameMutator::default().set_frame(&sys, &w, target));
        assert_eq!(3, sys.calls().len());
    }

    #[test]
    fn small_size_changes_only_move() {
        let (sys, w) = setup(Rect::new(0., 0., 400., 300.));
        let target = Rect::new(200., 100., 410., 290.);

        let result = FrameMutator::default().set_frame(&sys, &w, target);

        assert_eq!(Ok(Rect::new(200., 100., 400., 300.)), result);
        assert_eq!(vec![Call::Position(w, target.origin)], sys.calls());
    }

    #[test]
    fn frame_already_in_place_issues_no_calls() {
        let (sys, w) = setup(Rect::new(0., 0., 400., 300.));
        let target = Rect::new(1., 2., 401., 300.);
        assert_eq!(
            Ok(Rect::new(0., 0., 400., 300.)),
            FrameMutator::default().set_frame(&sys, &w, target)
        );
        assert!(sys.calls().is_empty());
        assert!(sys.settles().is_empty());
    }

    #[test]
    fn retries_when_calls_are_ignored() {
        let (sys, w) = setup(Rect::new(0., 0., 300., 300.));
        sys.update(w, |w| w.ignore_calls = 3);
        let target = Rect::new(100., 100., 600., 500.);

        assert_eq!(Ok(target), FrameMutator::default().set_frame(&sys, &w, target));
        assert_eq!(6, sys.calls().len());
    }

    #[test]
    fn applies_deferred_geometry_after_settling() {
        let (sys, w) = setup(Rect::new(0., 0., 300., 300.));
        sys.update(w, |w| w.deferred = true);
        let target = Rect::new(100., 100., 600., 500.);
        assert_eq!(Ok(target), FrameMutator::default().set_frame(&sys, &w, target));
    }

    #[test]
    fn clamped_frame_is_accepted_not_an_error() {
        let (sys, w) = setup(Rect::new(0., 0., 500., 500.));
        sys.update(w, |w| w.min_size = Size::new(300., 300.));
        let target = Rect::new(50., 50., 200., 200.);

        let result = FrameMutator::default().set_frame(&sys, &w, target);

        assert_eq!(Ok(Rect::new(50., 50., 300., 300.)), result);
        assert_eq!(9, sys.calls().len());
    }

    #[test]
    fn busy_window_gets_every_attempt() {
        let (sys, w) = setup(Rect::new(0., 0., 300., 300.));
        // Swallows the first two attempts whole.
        sys.update(w, |w| w.ignore_calls = 6);
        let target = Rect::new(100., 100., 600., 500.);

        assert_eq!(Ok(target), FrameMutator::default().set_frame(&sys, &w, target));
        assert_eq!(9, sys.calls().len());
        assert_eq!(Call::Position(w, target.origin), sys.calls_for(w)[6]);
    }

    #[test]
    fn unreadable_frame_reports_last_observed() {
        let (sys, w) = setup(Rect::new(0., 0., 300., 300.));
        sys.update(w, |w| w.ignore_calls = 100);
        let target = Rect::new(100., 100., 600., 500.);
        let mutator = FrameMutator::default();
        let mut mutation = mutator.begin(&sys, &w, target).unwrap();

        // One full attempt, then the retry's three calls.
        for _ in 0..6 {
            assert_eq!(Ok(Progress::Settle(SETTLE_DELAY)), mutation.advance());
        }
        sys.update(w, |w| w.unreadable_frames = 1);

        let unmoved = Rect::new(0., 0., 300., 300.);
        assert_eq!(Ok(Progress::Done(unmoved)), mutation.advance());
        assert_eq!(unmoved, sys.frame_of(w));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let (sys, w) = setup(Rect::new(0., 0., 300., 300.));
        sys.update(w, |w| w.ignore_calls = 100);
        let target = Rect::new(100., 100., 600., 500.);

        let mutator = FrameMutator::new(MUTATION_TOLERANCE, SIZE_SKIP_THRESHOLD, SETTLE_DELAY, 2);
        assert_eq!(Ok(Rect::new(0., 0., 300., 300.)), mutator.set_frame(&sys, &w, target));
        assert_eq!(6, sys.calls().len());
    }

    #[test]
    fn dead_window_is_gone() {
        let (sys, w) = setup(Rect::new(0., 0., 300., 300.));
        sys.kill(w);
        let target = Rect::new(100., 100., 600., 500.);
        assert_eq!(Err(FrameError::Gone), FrameMutator::default().set_frame(&sys, &w, target));
        assert!(sys.settles().is_empty());
    }

    #[test]
    fn window_dying_mid_mutation_is_gone() {
        let (sys, w) = setup(Rect::new(0., 0., 300., 300.));
        let target = Rect::new(100., 100., 600., 500.);
        let mutator = FrameMutator::default();
        let mut mutation = mutator.begin(&sys, &w, target).unwrap();
        assert_eq!(Ok(Progress::Settle(SETTLE_DELAY)), mutation.advance());
        sys.kill(w);
        assert_eq!(Err(FrameError::Gone), mutation.advance());
    }

    #[test]
    fn stepping_needs_no_real_delay() {
        let (sys, w) = setup(Rect::new(0., 0., 300., 300.));
        let target = Rect::new(10., 10., 200., 200.);
        let mutator = FrameMutator::default();
        let mut mutation = mutator.begin(&sys, &w, target).unwrap();
        assert_eq!(Direction::Shrink, mutation.direction());

        let mut settles = 0;
        let done = loop {
            match mutation.advance().unwrap() {
                Progress::Settle(_) => settles += 1,
                Progress::Done(frame) => break frame,
            }
        };
        assert_eq!(target, done);
        assert_eq!(3, settles);
        assert_eq!(1, mutation.attempts());
        assert!(sys.settles().is_empty());
    }

    #[test]
    fn set_position_keeps_size() {
        let (sys, w) = setup(Rect::new(0., 0., 400., 300.));
        let result = FrameMutator::default().set_position(&sys, &w, Point::new(50., 60.));
        assert_eq!(Ok(Rect::new(50., 60., 400., 300.)), result);
        assert_eq!(vec![Call::Position(w, Point::new(50., 60.))], sys.calls());
    }
}
