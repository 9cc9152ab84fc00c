use std::fmt::Debug;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::AxError;
use super::geometry::{Point, Rect, Size};
use super::window_server::{WindowServerId, WindowServerInfo, pid_t};

/// A running application as seen by the workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningApp {
    pub pid: pid_t,
    pub name: Option<String>,
    /// Dock-visible ("regular") activation policy.
    pub regular: bool,
}

/// Everything the core needs from the accessibility layer and the window
/// server. Every per-handle read is fallible: a handle may die at any moment.
pub trait System {
    /// An accessibility element. Equality is element identity.
    type Handle: Clone + PartialEq + Debug;

    /// Front-to-back snapshot of the window server's on-screen windows.
    fn window_list(&self) -> Vec<WindowServerInfo>;

    fn running_apps(&self) -> Vec<RunningApp>;

    fn own_pid(&self) -> pid_t;

    fn app_windows(&self, pid: pid_t) -> Result<Vec<Self::Handle>, AxError>;

    fn frame(&self, handle: &Self::Handle) -> Result<Rect, AxError>;

    fn title(&self, handle: &Self::Handle) -> Result<String, AxError>;

    fn role(&self, handle: &Self::Handle) -> Result<String, AxError>;

    fn pid(&self, handle: &Self::Handle) -> Result<pid_t, AxError>;

    fn is_minimized(&self, handle: &Self::Handle) -> Result<bool, AxError>;

    fn parent(&self, handle: &Self::Handle) -> Result<Self::Handle, AxError>;

    /// The `AXWindow` attribute some elements expose to point straight at
    /// their containing window.
    fn owning_window(&self, handle: &Self::Handle) -> Result<Self::Handle, AxError>;

    /// The private direct lookup of a window's server id.
    fn window_id(&self, handle: &Self::Handle) -> Result<WindowServerId, AxError>;

    /// Reads a numeric attribute by name.
    fn number_attribute(&self, handle: &Self::Handle, attribute: &str) -> Result<i64, AxError>;

    fn set_position(&self, handle: &Self::Handle, position: Point) -> Result<(), AxError>;

    fn set_size(&self, handle: &Self::Handle, size: Size) -> Result<(), AxError>;

    /// Accessibility hit test at a screen point.
    fn element_at(&self, point: Point) -> Result<Self::Handle, AxError>;

    /// Blocks while the window manager catches up with requested geometry.
    fn settle(&self, delay: Duration);
}
