use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::trace;

use super::identity::{FRAME_TOLERANCE, IdentityResolver, closest_match};
use crate::sys::System;
use crate::sys::window_server::{WindowServerId, WindowServerInfo, pid_t};

/// Overlap, as a fraction of the target's area, above which it is covered.
pub const COVERAGE_AREA_RATIO: f64 = 0.005;

/// Windows smaller than this on either axis never cover anything.
pub const MIN_WINDOW_DIMENSION: f64 = 10.0;

pub const MIN_ALPHA: f64 = 0.05;

/// Layers at or above this are system chrome (menu bar, dock).
pub const SYSTEM_LAYER_THRESHOLD: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Visibility {
    Visible,
    Covered,
    NotOnScreen,
}

#[derive(Debug, Clone)]
pub struct VisibilityClassifier {
    frame_tolerance: f64,
    coverage_area_ratio: f64,
    min_dimension: f64,
    min_alpha: f64,
    system_layer_threshold: i32,
    /// Windows of this process never cover anything.
    ignored_pid: Option<pid_t>,
}

impl Default for VisibilityClassifier {
    fn default() -> Self {
        Self::new(
            FRAME_TOLERANCE,
            COVERAGE_AREA_RATIO,
            MIN_WINDOW_DIMENSION,
            MIN_ALPHA,
            SYSTEM_LAYER_THRESHOLD,
        )
    }
}

impl VisibilityClassifier {
    pub fn new(
        frame_tolerance: f64,
        coverage_area_ratio: f64,
        min_dimension: f64,
        min_alpha: f64,
        system_layer_threshold: i32,
    ) -> Self {
        Self {
            frame_tolerance,
            coverage_area_ratio,
            min_dimension,
            min_alpha,
            system_layer_threshold,
            ignored_pid: None,
        }
    }

    pub fn ignoring_pid(mut self, pid: Option<pid_t>) -> Self {
        self.ignored_pid = pid;
        self
    }

    /// Classifies `handle` against a fresh window list. `exclude` is ignored
    /// both when locating the target and when scanning for coverage.
    pub fn classify<S: System>(
        &self,
        system: &S,
        identity: &IdentityResolver,
        handle: &S::Handle,
        exclude: Option<WindowServerId>,
    ) -> Visibility {
        let windows = system.window_list();
        let Some(index) = self.locate(system, identity, handle, &windows, exclude) else {
            return Visibility::NotOnScreen;
        };
        self.classify_at(&windows, index, exclude)
    }

    /// Classifies the window-server entry with `id`.
    pub fn classify_id(
        &self,
        windows: &[WindowServerInfo],
        id: WindowServerId,
        exclude: Option<WindowServerId>,
    ) -> Visibility {
        match windows.iter().position(|w| w.id == id && Some(w.id) != exclude) {
            Some(index) => self.classify_at(windows, index, exclude),
            None => Visibility::NotOnScreen,
        }
    }

    fn locate<S: System>(
        &self,
        system: &S,
        identity: &IdentityResolver,
        handle: &S::Handle,
        windows: &[WindowServerInfo],
        exclude: Option<WindowServerId>,
    ) -> Option<usize> {
        let candidates = || windows.iter().filter(|w| Some(w.id) != exclude);
        let found = match identity.direct_id(system, handle) {
            Some(id) => candidates().find(|w| w.id == id),
            None => {
                let frame = system.frame(handle).ok()?;
                let by_pid = system
                    .pid(handle)
                    .ok()
                    .and_then(|pid| closest_match(candidates(), pid, &frame, self.frame_tolerance));
                by_pid.or_else(|| {
                    candidates().find(|w| w.frame.same_as_within(&frame, self.frame_tolerance))
                })
            }
        }?;
        windows.iter().position(|w| w.id == found.id)
    }

    fn classify_at(
        &self,
        windows: &[WindowServerInfo],
        index: usize,
        exclude: Option<WindowServerId>,
    ) -> Visibility {
        let target = &windows[index];
        let threshold = target.frame.area() * self.coverage_area_ratio;
        let cover = windows[..index].iter().find(|w| {
            self.can_cover(w, exclude) && w.frame.intersection_area(&target.frame) > threshold
        });
        match cover {
            Some(cover) => {
                trace!(target = %target.id, by = %cover.id, "Window is covered");
                Visibility::Covered
            }
            None => Visibility::Visible,
        }
    }

    fn can_cover(&self, window: &WindowServerInfo, exclude: Option<WindowServerId>) -> bool {
        Some(window.id) != exclude
            && Some(window.pid) != self.ignored_pid
            && window.frame.size.width >= self.min_dimension
            && window.frame.size.height >= self.min_dimension
            && window.alpha >= self.min_alpha
            && window.layer < self.system_layer_threshold
    }
}
