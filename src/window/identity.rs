//! Correlates accessibility handles with window-server windows.

use tracing::{debug, trace};

use crate::sys::geometry::{Point, Rect};
use crate::sys::window_server::{WindowServerId, WindowServerInfo};
use crate::sys::System;

/// Per-edge tolerance when recovering an id from the window list by frame.
pub const FRAME_TOLERANCE: f64 = 10.0;

/// Ancestor walk limit for hit-test results. Some toolkits nest deeply.
pub const MAX_ANCESTOR_DEPTH: usize = 50;

/// Numeric attributes different app frameworks use to carry the window id.
pub const WINDOW_ID_ATTRIBUTES: &[&str] = &["AXWindowNumber", "_AXWindowNumber", "AXWindowID"];

pub const WINDOW_ROLE: &str = "AXWindow";

#[derive(Debug, Clone)]
pub struct IdentityResolver {
    frame_tolerance: f64,
    max_ancestor_depth: usize,
}

impl Default for IdentityResolver {
    fn default() -> Self { Self::new(FRAME_TOLERANCE, MAX_ANCESTOR_DEPTH) }
}

impl IdentityResolver {
    pub fn new(frame_tolerance: f64, max_ancestor_depth: usize) -> Self {
        Self { frame_tolerance, max_ancestor_depth }
    }

    /// The id the handle itself reports, without consulting the window list.
    pub fn direct_id<S: System>(&self, system: &S, handle: &S::Handle) -> Option<WindowServerId> {
        if let Ok(id) = system.window_id(handle) {
            return Some(id);
        }
        WINDOW_ID_ATTRIBUTES.iter().find_map(|attribute| {
            let value = system.number_attribute(handle, attribute).ok()?;
            u32::try_from(value).ok().filter(|&id| id != 0).map(WindowServerId::new)
        })
    }

    /// Resolves against a fresh window-server snapshot.
    pub fn resolve<S: System>(&self, system: &S, handle: &S::Handle) -> Option<WindowServerId> {
        if let Some(id) = self.direct_id(system, handle) {
            return Some(id);
        }
        self.recover_id(system, handle, &system.window_list())
    }

    /// Frame-proximity fallback: the closest entry owned by the same process
    /// whose bounds match within the tolerance.
    fn recover_id<S: System>(
        &self,
        system: &S,
        handle: &S::Handle,
        windows: &[WindowServerInfo],
    ) -> Option<WindowServerId> {
        let pid = system.pid(handle).ok()?;
        let frame = system.frame(handle).ok()?;
        let found = closest_match(windows, pid, &frame, self.frame_tolerance).map(|w| w.id);
        match found {
            Some(id) => trace!(?id, pid, "Recovered window id by frame"),
            None => debug!(pid, ?frame, "Could not correlate window"),
        }
        found
    }

    pub fn frame_of<S: System>(&self, system: &S, handle: &S::Handle) -> Option<Rect> {
        system.frame(handle).ok()
    }

    pub fn title_of<S: System>(&self, system: &S, handle: &S::Handle) -> String {
        system.title(handle).unwrap_or_default()
    }

    /// The window containing whatever element sits at `point`.
    pub fn window_under_point<S: System>(&self, system: &S, point: Point) -> Option<S::Handle> {
        let hit = match system.element_at(point) {
            Ok(hit) => hit,
            Err(err) => {
                debug!(?point, %err, "Hit test failed");
                return None;
            }
        };
        if is_window(system, &hit) {
            return Some(hit);
        }
        if let Ok(window) = system.owning_window(&hit) {
            if is_window(system, &window) {
                return Some(window);
            }
        }
        let mut current = hit;
        for _ in 0..self.max_ancestor_depth {
            current = match system.parent(&current) {
                Ok(parent) => parent,
                Err(err) => {
                    trace!(%err, "Ancestor walk stopped");
                    return None;
                }
            };
            if is_window(system, &current) {
                return Some(current);
            }
        }
        debug!(?point, "No window within ancestor depth limit");
        None
    }
}

fn is_window<S: System>(system: &S, handle: &S::Handle) -> bool {
    system.role(handle).is_ok_and(|role| role == WINDOW_ROLE)
}

/// The entry owned by `pid` whose frame is within `tolerance` per edge of
/// `frame`, preferring the smallest aggregate error and the frontmost on ties.
pub fn closest_match<'a>(
    windows: impl IntoIterator<Item = &'a WindowServerInfo>,
    pid: crate::sys::window_server::pid_t,
    frame: &Rect,
    tolerance: f64,
) -> Option<&'a WindowServerInfo> {
    windows
        .into_iter()
        .filter(|w| w.pid == pid && w.frame.same_as_within(frame, tolerance))
        .fold(None, |best: Option<&WindowServerInfo>, w| match best {
            Some(b) if b.frame.aggregate_error(frame) <= w.frame.aggregate_error(frame) => Some(b),
            _ => Some(w),
        })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_log::test;

    use super::*;
    use crate::sys::testing::FakeSystem;

    #[test]
    fn prefers_the_direct_id() {
        let sys = FakeSystem::new();
        sys.add_app(10, "Editor", true);
        let w = sys.add_window(10, Rect::new(0., 0., 400., 300.));
        assert_eq!(Some(sys.id_of(w)), IdentityResolver::default().resolve(&sys, &w));
    }

    #[test]
    fn tries_attribute_aliases() {
        let sys = FakeSystem::new();
        sys.add_app(10, "Editor", true);
        let w = sys.add_window(10, Rect::new(0., 0., 400., 300.));
        sys.update(w, |w| {
            w.private_id = false;
            w.id_attribute = Some("AXWindowID");
        });
        let resolver = IdentityResolver::default();
        assert_eq!(Some(sys.id_of(w)), resolver.direct_id(&sys, &w));
    }

    #[test]
    fn falls_back_to_frame_match_within_same_process() {
        let sys = FakeSystem::new();
        sys.add_app(10, "Editor", true);
        sys.add_app(11, "Other", true);
        let other = sys.add_window(11, Rect::new(0., 0., 400., 300.));
        let w = sys.add_window(10, Rect::new(0., 0., 400., 300.));
        sys.update(w, |w| w.private_id = false);
        let resolver = IdentityResolver::default();
        assert_eq!(None, resolver.direct_id(&sys, &w));
        assert_eq!(Some(sys.id_of(w)), resolver.resolve(&sys, &w));
        assert_ne!(Some(sys.id_of(other)), resolver.resolve(&sys, &w));
    }

    #[test]
    fn frame_match_picks_closest_entry() {
        let windows = vec![
            WindowServerInfo {
                id: WindowServerId::new(1),
                pid: 10,
                layer: 0,
                alpha: 1.0,
                frame: Rect::new(8., 0., 400., 300.),
                owner_name: None,
            },
            WindowServerInfo {
                id: WindowServerId::new(2),
                pid: 10,
                layer: 0,
                alpha: 1.0,
                frame: Rect::new(2., 0., 400., 300.),
                owner_name: None,
            },
            WindowServerInfo {
                id: WindowServerId::new(3),
                pid: 10,
                layer: 0,
                alpha: 1.0,
                frame: Rect::new(30., 0., 400., 300.),
                owner_name: None,
            },
        ];
        let target = Rect::new(0., 0., 400., 300.);
        assert_eq!(
            Some(WindowServerId::new(2)),
            closest_match(&windows, 10, &target, FRAME_TOLERANCE).map(|w| w.id)
        );
        assert_eq!(None, closest_match(&windows, 11, &target, FRAME_TOLERANCE));
    }

    #[test]
    fn unknown_when_nothing_matches() {
        let sys = FakeSystem::new();
        sys.add_app(10, "Editor", true);
        let w = sys.add_window(10, Rect::new(0., 0., 400., 300.));
        sys.update(w, |w| {
            w.private_id = false;
            w.on_screen = false;
        });
        assert_eq!(None, IdentityResolver::default().resolve(&sys, &w));
        // Still a live window as far as the caller is concerned.
        assert!(IdentityResolver::default().frame_of(&sys, &w).is_some());
    }

    #[test]
    fn dead_handles_have_no_frame_or_title() {
        let sys = FakeSystem::new();
        sys.add_app(10, "Editor", true);
        let w = sys.add_window(10, Rect::new(0., 0., 400., 300.));
        sys.kill(w);
        let resolver = IdentityResolver::default();
        assert_eq!(None, resolver.frame_of(&sys, &w));
        assert_eq!("", resolver.title_of(&sys, &w));
        assert_eq!(None, resolver.resolve(&sys, &w));
    }

    #[test]
    fn hit_test_returns_window_directly() {
        let sys = FakeSystem::new();
        sys.add_app(10, "Editor", true);
        let w = sys.add_window(10, Rect::new(0., 0., 400., 300.));
        let resolver = IdentityResolver::default();
        assert_eq!(Some(w), resolver.window_under_point(&sys, Point::new(10., 10.)));
        assert_eq!(None, resolver.window_under_point(&sys, Point::new(900., 900.)));
    }

    #[test]
    fn hit_test_uses_owning_window_attribute() {
        let sys = FakeSystem::new();
        sys.add_app(10, "Editor", true);
        let w = sys.add_window(10, Rect::new(0., 0., 400., 300.));
        sys.add_element("AXButton", Rect::new(10., 10., 20., 20.), None, Some(w));
        let resolver = IdentityResolver::default();
        assert_eq!(Some(w), resolver.window_under_point(&sys, Point::new(15., 15.)));
    }

    #[test]
    fn hit_test_walks_ancestors_up_to_the_limit() {
        let sys = FakeSystem::new();
        sys.add_app(10, "Editor", true);
        let w = sys.add_window(10, Rect::new(0., 0., 400., 300.));
        let mut parent = sys.add_element("AXGroup", Rect::new(0., 0., 1., 1.), Some(w), None);
        for _ in 0..9 {
            parent = sys.add_element("AXGroup", Rect::new(0., 0., 1., 1.), Some(parent), None);
        }
        sys.add_element("AXStaticText", Rect::new(50., 50., 10., 10.), Some(parent), None);

        let point = Point::new(55., 55.);
        assert_eq!(Some(w), IdentityResolver::new(FRAME_TOLERANCE, 50).window_under_point(&sys, point));
        assert_eq!(None, IdentityResolver::new(FRAME_TOLERANCE, 5).window_under_point(&sys, point));
    }

    #[test]
    fn hit_test_on_orphan_element_finds_nothing() {
        let sys = FakeSystem::new();
        sys.add_app(10, "Editor", true);
        sys.add_window(10, Rect::new(0., 0., 400., 300.));
        let group = sys.add_element("AXGroup", Rect::new(0., 0., 1., 1.), None, None);
        sys.add_element("AXStaticText", Rect::new(50., 50., 10., 10.), Some(group), None);

        let point = Point::new(55., 55.);
        assert_eq!(None, IdentityResolver::default().window_under_point(&sys, point));
    }
}
