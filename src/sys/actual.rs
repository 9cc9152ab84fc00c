//! The live macOS system.

use std::cell::RefCell;
use std::thread;
use std::time::Duration;

use super::app;
use super::app_cache::AppHandleCache;
use super::axuielement::AXUIElement;
use super::error::AxError;
use super::geometry::{Point, Rect, Size};
use super::system::{RunningApp, System};
use super::window_server::{self, WindowServerId, WindowServerInfo, pid_t};

pub struct Actual {
    apps: RefCell<AppHandleCache<AXUIElement>>,
    system_wide: AXUIElement,
    own_pid: pid_t,
}

impl Actual {
    pub fn new() -> Self {
        Actual {
            apps: RefCell::new(AppHandleCache::new()),
            system_wide: AXUIElement::system_wide(),
            own_pid: std::process::id() as pid_t,
        }
    }

    fn app_element(&self, pid: pid_t) -> Result<AXUIElement, AxError> {
        self.apps.borrow_mut().get_or_try_insert_with(pid, || Ok(AXUIElement::application(pid)))
    }
}

impl System for Actual {
    type Handle = AXUIElement;

    fn window_list(&self) -> Vec<WindowServerInfo> { window_server::get_visible_windows() }

    fn running_apps(&self) -> Vec<RunningApp> {
        let apps = app::running_apps();
        self.apps.borrow_mut().retain_running(apps.iter().map(|app| app.pid));
        apps
    }

    fn own_pid(&self) -> pid_t { self.own_pid }

    fn app_windows(&self, pid: pid_t) -> Result<Vec<AXUIElement>, AxError> {
        let app = self.app_element(pid)?;
        match app.windows() {
            Err(err) if err.is_dead() => {
                self.apps.borrow_mut().remove(pid);
                Err(err)
            }
            other => other,
        }
    }

    fn frame(&self, handle: &AXUIElement) -> Result<Rect, AxError> { handle.frame() }

    fn title(&self, handle: &AXUIElement) -> Result<String, AxError> { handle.title() }

    fn role(&self, handle: &AXUIElement) -> Result<String, AxError> { handle.role() }

    fn pid(&self, handle: &AXUIElement) -> Result<pid_t, AxError> { handle.pid() }

    fn is_minimized(&self, handle: &AXUIElement) -> Result<bool, AxError> { handle.minimized() }

    fn parent(&self, handle: &AXUIElement) -> Result<AXUIElement, AxError> { handle.parent() }

    fn owning_window(&self, handle: &AXUIElement) -> Result<AXUIElement, AxError> {
        handle.window()
    }

    fn window_id(&self, handle: &AXUIElement) -> Result<WindowServerId, AxError> {
        handle.window_id()
    }

    fn number_attribute(&self, handle: &AXUIElement, attribute: &str) -> Result<i64, AxError> {
        handle.number_attribute(attribute)
    }

    fn set_position(&self, handle: &AXUIElement, position: Point) -> Result<(), AxError> {
        handle.set_position(position)
    }

    fn set_size(&self, handle: &AXUIElement, size: Size) -> Result<(), AxError> {
        handle.set_size(size)
    }

    fn element_at(&self, point: Point) -> Result<AXUIElement, AxError> {
        self.system_wide.element_at(point)
    }

    fn settle(&self, delay: Duration) { thread::sleep(delay) }
}
