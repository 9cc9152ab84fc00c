//! Enumerates the windows a user can swap with.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::identity::{IdentityResolver, closest_match};
use super::visibility::MIN_WINDOW_DIMENSION;
use crate::sys::System;
use crate::sys::geometry::Rect;
use crate::sys::window_server::{WindowServerId, WindowServerInfo, pid_t};

/// Per-edge tolerance for a positive frame match.
pub const FRAME_TOLERANCE: f64 = 5.0;

pub const MIN_ALPHA: f64 = 0.1;

/// One window correlated across the accessibility tree and the window
/// server. Only valid for the scan that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRecord<H> {
    pub id: WindowServerId,
    pub handle: H,
    pub pid: pid_t,
    pub app_name: Option<String>,
    pub frame: Rect,
    pub title: String,
}

/// The serializable part of a [`WindowRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub id: WindowServerId,
    pub pid: pid_t,
    pub app_name: Option<String>,
    pub frame: Rect,
    pub title: String,
}

impl<H> WindowRecord<H> {
    pub fn summary(&self) -> WindowSummary {
        WindowSummary {
            id: self.id,
            pid: self.pid,
            app_name: self.app_name.clone(),
            frame: self.frame,
            title: self.title.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WindowDiscovery {
    frame_tolerance: f64,
    min_dimension: f64,
    min_alpha: f64,
}

impl Default for WindowDiscovery {
    fn default() -> Self { Self::new(FRAME_TOLERANCE, MIN_WINDOW_DIMENSION, MIN_ALPHA) }
}

impl WindowDiscovery {
    pub fn new(frame_tolerance: f64, min_dimension: f64, min_alpha: f64) -> Self {
        Self { frame_tolerance, min_dimension, min_alpha }
    }

    fn eligible(&self, window: &WindowServerInfo, own_pid: pid_t) -> bool {
        window.layer == 0
            && window.pid != own_pid
            && window.frame.at_least(self.min_dimension, self.min_dimension)
            && window.alpha >= self.min_alpha
    }

    /// A full fresh scan, front to back. Each window-server entry appears at
    /// most once.
    pub fn list_eligible_windows<S: System>(
        &self,
        system: &S,
        identity: &IdentityResolver,
    ) -> Vec<WindowRecord<S::Handle>> {
        let own_pid = system.own_pid();
        let pool: Vec<WindowServerInfo> =
            system.window_list().into_iter().filter(|w| self.eligible(w, own_pid)).collect();
        let mut claimed: Vec<Option<WindowRecord<S::Handle>>> = vec![None; pool.len()];

        for app in system.running_apps() {
            if !app.regular || app.pid == own_pid {
                continue;
            }
            let handles = match system.app_windows(app.pid) {
                Ok(handles) => handles,
                Err(err) => {
                    debug!(pid = app.pid, %err, "Cannot enumerate app windows");
                    continue;
                }
            };
            for handle in handles {
                if matches!(system.is_minimized(&handle), Ok(true)) {
                    continue;
                }
                let Some(index) = self.claim(system, identity, &handle, app.pid, &pool, &claimed)
                else {
                    trace!(pid = app.pid, ?handle, "Dropping uncorrelated window");
                    continue;
                };
                let entry = &pool[index];
                claimed[index] = Some(WindowRecord {
                    id: entry.id,
                    frame: system.frame(&handle).unwrap_or(entry.frame),
                    title: system.title(&handle).unwrap_or_default(),
                    handle,
                    pid: app.pid,
                    app_name: app.name.clone(),
                });
            }
        }

        claimed.into_iter().flatten().collect()
    }

    fn claim<S: System>(
        &self,
        system: &S,
        identity: &IdentityResolver,
        handle: &S::Handle,
        pid: pid_t,
        pool: &[WindowServerInfo],
        claimed: &[Option<WindowRecord<S::Handle>>],
    ) -> Option<usize> {
        let free = || pool.iter().enumerate().filter(|(i, _)| claimed[*i].is_none());
        if let Some(id) = identity.direct_id(system, handle) {
            return free().find(|(_, w)| w.id == id && w.pid == pid).map(|(i, _)| i);
        }
        let frame = system.frame(handle).ok()?;
        let best = closest_match(free().map(|(_, w)| w), pid, &frame, self.frame_tolerance)?;
        pool.iter().position(|w| w.id == best.id)
    }
}
