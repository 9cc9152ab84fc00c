//! An in-memory window server and accessibility tree for tests.

use std::cell::RefCell;
use std::time::Duration;

use super::error::AxError;
use super::geometry::{Point, Rect, Size};
use super::system::{RunningApp, System};
use super::window_server::{WindowServerId, WindowServerInfo, pid_t};

pub const OWN_PID: pid_t = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FakeHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Call {
    Position(FakeHandle, Point),
    Size(FakeHandle, Size),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Position(Point),
    Size(Size),
}

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub handle: FakeHandle,
    pub id: WindowServerId,
    pub pid: pid_t,
    pub frame: Rect,
    pub title: String,
    pub layer: i32,
    pub alpha: f64,
    pub minimized: bool,
    /// Present in the window server's on-screen list.
    pub on_screen: bool,
    pub alive: bool,
    /// Has an accessibility element at all.
    pub accessible: bool,
    /// Answers the private direct id lookup.
    pub private_id: bool,
    /// Named numeric attribute carrying the id, if any.
    pub id_attribute: Option<&'static str>,
    pub min_size: Size,
    pub max_size: Option<Size>,
    /// Geometry calls take effect only on the next settle.
    pub deferred: bool,
    /// Number of upcoming size calls the window silently drops.
    pub drop_sizes: u32,
    /// Number of upcoming geometry calls the window silently ignores.
    pub ignore_calls: u32,
    /// Closes on its next geometry call.
    pub doomed: bool,
    /// Number of upcoming frame reads that fail without the window dying.
    pub unreadable_frames: u32,
    /// Answers `AXMinimized` reads with "unsupported".
    pub minimized_unsupported: bool,
    pending: Vec<Op>,
}

#[derive(Debug, Clone)]
struct Element {
    handle: FakeHandle,
    role: String,
    frame: Rect,
    parent: Option<FakeHandle>,
    window: Option<FakeHandle>,
}

#[derive(Debug, Default)]
struct State {
    /// Front to back.
    windows: Vec<FakeWindow>,
    elements: Vec<Element>,
    apps: Vec<RunningApp>,
    screen: Option<Rect>,
    next: u32,
    calls: Vec<Call>,
    settles: Vec<Duration>,
}

#[derive(Debug, Default)]
pub struct FakeSystem {
    state: RefCell<State>,
}

impl FakeSystem {
    pub fn new() -> Self {
        let this = FakeSystem::default();
        this.add_app(OWN_PID, "swapr", false);
        this
    }

    pub fn add_app(&self, pid: pid_t, name: &str, regular: bool) {
        self.state.borrow_mut().apps.push(RunningApp {
            pid,
            name: Some(name.to_string()),
            regular,
        });
    }

    pub fn quit_app(&self, pid: pid_t) {
        let mut state = self.state.borrow_mut();
        state.apps.retain(|app| app.pid != pid);
        for window in state.windows.iter_mut().filter(|w| w.pid == pid) {
            window.alive = false;
        }
    }

    /// Clips growth against the screen edge, like the OS does while a window
    /// is being resized in place.
    pub fn set_screen(&self, screen: Rect) { self.state.borrow_mut().screen = Some(screen); }

    /// Adds a window in front of every existing window.
    pub fn add_window(&self, pid: pid_t, frame: Rect) -> FakeHandle {
        let mut state = self.state.borrow_mut();
        state.next += 1;
        let handle = FakeHandle(state.next);
        let window = FakeWindow {
            handle,
            id: WindowServerId::new(1000 + state.next),
            pid,
            frame,
            title: format!("window {}", state.next),
            layer: 0,
            alpha: 1.0,
            minimized: false,
            on_screen: true,
            alive: true,
            accessible: true,
            private_id: true,
            id_attribute: None,
            min_size: Size::new(0.0, 0.0),
            max_size: None,
            deferred: false,
            drop_sizes: 0,
            ignore_calls: 0,
            doomed: false,
            unreadable_frames: 0,
            minimized_unsupported: false,
            pending: Vec::new(),
        };
        state.windows.insert(0, window);
        handle
    }

    /// Adds a window-server-only surface (no accessibility element), such as
    /// the menu bar or an overlay.
    pub fn add_surface(&self, pid: pid_t, frame: Rect, layer: i32, alpha: f64) -> WindowServerId {
        let handle = self.add_window(pid, frame);
        self.update(handle, |w| {
            w.layer = layer;
            w.alpha = alpha;
            w.accessible = false;
        });
        self.id_of(handle)
    }

    /// Adds a non-window element with an optional parent and owning window.
    pub fn add_element(
        &self,
        role: &str,
        frame: Rect,
        parent: Option<FakeHandle>,
        window: Option<FakeHandle>,
    ) -> FakeHandle {
        let mut state = self.state.borrow_mut();
        state.next += 1;
        let handle = FakeHandle(state.next);
        state.elements.push(Element {
            handle,
            role: role.to_string(),
            frame,
            parent,
            window,
        });
        handle
    }

    pub fn update(&self, handle: FakeHandle, f: impl FnOnce(&mut FakeWindow)) {
        let mut state = self.state.borrow_mut();
        let window = state.windows.iter_mut().find(|w| w.handle == handle).unwrap();
        f(window);
    }

    pub fn window(&self, handle: FakeHandle) -> FakeWindow {
        self.state.borrow().windows.iter().find(|w| w.handle == handle).unwrap().clone()
    }

    pub fn frame_of(&self, handle: FakeHandle) -> Rect { self.window(handle).frame }

    pub fn id_of(&self, handle: FakeHandle) -> WindowServerId { self.window(handle).id }

    pub fn kill(&self, handle: FakeHandle) { self.update(handle, |w| w.alive = false); }

    pub fn raise(&self, handle: FakeHandle) {
        let mut state = self.state.borrow_mut();
        let idx = state.windows.iter().position(|w| w.handle == handle).unwrap();
        let window = state.windows.remove(idx);
        state.windows.insert(0, window);
    }

    pub fn calls(&self) -> Vec<Call> { self.state.borrow().calls.clone() }

    pub fn calls_for(&self, handle: FakeHandle) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                Call::Position(h, _) | Call::Size(h, _) => *h == handle,
            })
            .collect()
    }

    pub fn settles(&self) -> Vec<Duration> { self.state.borrow().settles.clone() }

    fn live_window<T>(
        &self,
        handle: &FakeHandle,
        f: impl FnOnce(&FakeWindow) -> Result<T, AxError>,
    ) -> Result<T, AxError> {
        let state = self.state.borrow();
        match state.windows.iter().find(|w| w.handle == *handle) {
            Some(window) if window.alive => f(window),
            Some(_) => Err(AxError::InvalidElement),
            None => Err(AxError::InvalidElement),
        }
    }

    fn element(&self, handle: &FakeHandle) -> Option<Element> {
        self.state.borrow().elements.iter().find(|e| e.handle == *handle).cloned()
    }

    fn mutate(&self, handle: &FakeHandle, op: Op) -> Result<(), AxError> {
        let mut state = self.state.borrow_mut();
        state.calls.push(match op {
            Op::Position(p) => Call::Position(*handle, p),
            Op::Size(s) => Call::Size(*handle, s),
        });
        let screen = state.screen;
        let Some(window) = state.windows.iter_mut().find(|w| w.handle == *handle) else {
            return Err(AxError::InvalidElement);
        };
        if !window.alive {
            return Err(AxError::InvalidElement);
        }
        if window.doomed {
            window.alive = false;
            return Err(AxError::InvalidElement);
        }
        if window.ignore_calls > 0 {
            window.ignore_calls -= 1;
            return Ok(());
        }
        if let Op::Size(_) = op {
            if window.drop_sizes > 0 {
                window.drop_sizes -= 1;
                return Ok(());
            }
        }
        if window.deferred {
            window.pending.push(op);
        } else {
            apply(window, op, screen);
        }
        Ok(())
    }
}

fn apply(window: &mut FakeWindow, op: Op, screen: Option<Rect>) {
    match op {
        Op::Position(p) => window.frame.origin = p,
        Op::Size(s) => {
            let mut width = s.width.max(window.min_size.width);
            let mut height = s.height.max(window.min_size.height);
            if let Some(max) = window.max_size {
                width = width.min(max.width);
                height = height.min(max.height);
            }
            if let Some(screen) = screen {
                width = width.min(screen.max_x() - window.frame.origin.x).max(window.min_size.width);
                height =
                    height.min(screen.max_y() - window.frame.origin.y).max(window.min_size.height);
            }
            window.frame.size = Size::new(width, height);
        }
    }
}

impl System for FakeSystem {
    type Handle = FakeHandle;

    fn window_list(&self) -> Vec<WindowServerInfo> {
        let state = self.state.borrow();
        state
            .windows
            .iter()
            .filter(|w| w.alive && w.on_screen && !w.minimized)
            .map(|w| WindowServerInfo {
                id: w.id,
                pid: w.pid,
                layer: w.layer,
                alpha: w.alpha,
                frame: w.frame,
                owner_name: state
                    .apps
                    .iter()
                    .find(|app| app.pid == w.pid)
                    .and_then(|app| app.name.clone()),
            })
            .collect()
    }

    fn running_apps(&self) -> Vec<RunningApp> { self.state.borrow().apps.clone() }

    fn own_pid(&self) -> pid_t { OWN_PID }

    fn app_windows(&self, pid: pid_t) -> Result<Vec<FakeHandle>, AxError> {
        let state = self.state.borrow();
        if !state.apps.iter().any(|app| app.pid == pid) {
            return Err(AxError::InvalidElement);
        }
        // Accessibility order is unrelated to stacking order.
        let mut handles: Vec<_> = state
            .windows
            .iter()
            .filter(|w| w.alive && w.accessible && w.pid == pid)
            .map(|w| w.handle)
            .collect();
        handles.sort();
        Ok(handles)
    }

    fn frame(&self, handle: &FakeHandle) -> Result<Rect, AxError> {
        if let Some(element) = self.element(handle) {
            return Ok(element.frame);
        }
        {
            let mut state = self.state.borrow_mut();
            let window = state.windows.iter_mut().find(|w| w.handle == *handle && w.alive);
            if let Some(window) = window.filter(|w| w.unreadable_frames > 0) {
                window.unreadable_frames -= 1;
                return Err(AxError::CannotComplete);
            }
        }
        self.live_window(handle, |w| Ok(w.frame))
    }

    fn title(&self, handle: &FakeHandle) -> Result<String, AxError> {
        self.live_window(handle, |w| Ok(w.title.clone()))
    }

    fn role(&self, handle: &FakeHandle) -> Result<String, AxError> {
        if let Some(element) = self.element(handle) {
            return Ok(element.role);
        }
        self.live_window(handle, |_| Ok("AXWindow".to_string()))
    }

    fn pid(&self, handle: &FakeHandle) -> Result<pid_t, AxError> {
        if let Some(element) = self.element(handle) {
            return match element.window {
                Some(window) => self.pid(&window),
                None => Err(AxError::NoValue),
            };
        }
        self.live_window(handle, |w| Ok(w.pid))
    }

    fn is_minimized(&self, handle: &FakeHandle) -> Result<bool, AxError> {
        self.live_window(handle, |w| {
            if w.minimized_unsupported { Err(AxError::AttributeUnsupported) } else { Ok(w.minimized) }
        })
    }

    fn parent(&self, handle: &FakeHandle) -> Result<FakeHandle, AxError> {
        match self.element(handle) {
            Some(element) => element.parent.ok_or(AxError::NoValue),
            None => self.live_window(handle, |_| Err(AxError::NoValue)),
        }
    }

    fn owning_window(&self, handle: &FakeHandle) -> Result<FakeHandle, AxError> {
        match self.element(handle) {
            Some(element) => element.window.ok_or(AxError::AttributeUnsupported),
            None => self.live_window(handle, |_| Err(AxError::AttributeUnsupported)),
        }
    }

    fn window_id(&self, handle: &FakeHandle) -> Result<WindowServerId, AxError> {
        self.live_window(handle, |w| {
            if w.private_id { Ok(w.id) } else { Err(AxError::Other(-25200)) }
        })
    }

    fn number_attribute(&self, handle: &FakeHandle, attribute: &str) -> Result<i64, AxError> {
        self.live_window(handle, |w| match w.id_attribute {
            Some(name) if name == attribute => Ok(i64::from(w.id.as_u32())),
            _ => Err(AxError::AttributeUnsupported),
        })
    }

    fn set_position(&self, handle: &FakeHandle, position: Point) -> Result<(), AxError> {
        self.mutate(handle, Op::Position(position))
    }

    fn set_size(&self, handle: &FakeHandle, size: Size) -> Result<(), AxError> {
        self.mutate(handle, Op::Size(size))
    }

    fn element_at(&self, point: Point) -> Result<FakeHandle, AxError> {
        let state = self.state.borrow();
        if let Some(element) = state.elements.iter().rev().find(|e| e.frame.contains(point)) {
            return Ok(element.handle);
        }
        state
            .windows
            .iter()
            .find(|w| {
                w.alive && w.accessible && w.on_screen && !w.minimized && w.frame.contains(point)
            })
            .map(|w| w.handle)
            .ok_or(AxError::NoValue)
    }

    fn settle(&self, delay: Duration) {
        let mut state = self.state.borrow_mut();
        state.settles.push(delay);
        let screen = state.screen;
        for window in state.windows.iter_mut() {
            for op in std::mem::take(&mut window.pending) {
                apply(window, op, screen);
            }
        }
    }
}
