use serde::{Deserialize, Serialize};

pub use nix::libc::pid_t;

use super::geometry::Rect;

/// Identifier the window server (compositor) assigns to an on-screen window
/// surface. This is the join key between the accessibility tree and the
/// window-server list.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowServerId(pub u32);

impl WindowServerId {
    #[inline]
    pub fn new(id: u32) -> Self { Self(id) }

    #[inline]
    pub fn as_u32(self) -> u32 { self.0 }
}

impl From<WindowServerId> for u32 {
    #[inline]
    fn from(id: WindowServerId) -> Self { id.0 }
}

impl std::fmt::Display for WindowServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.0.fmt(f) }
}

/// One entry of the window server's point-in-time, front-to-back window list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowServerInfo {
    pub id: WindowServerId,
    pub pid: pid_t,
    pub layer: i32,
    pub alpha: f64,
    pub frame: Rect,
    #[serde(default)]
    pub owner_name: Option<String>,
}

#[cfg(target_os = "macos")]
pub use self::macos::get_visible_windows;

#[cfg(target_os = "macos")]
mod macos {
    use objc2_core_foundation::{CFArray, CFDictionary, CFNumber, CFRetained, CFString, CFType};
    use objc2_core_graphics::{
        CGWindowListCopyWindowInfo, CGWindowListOption, kCGWindowAlpha, kCGWindowBounds,
        kCGWindowLayer, kCGWindowNumber, kCGWindowOwnerName, kCGWindowOwnerPID,
    };
    use tracing::trace;

    use super::{WindowServerId, WindowServerInfo};
    use crate::sys::geometry::Rect;

    type Entry = CFDictionary<CFString, CFType>;

    /// Window server snapshot of every on-screen window, front to back.
    pub fn get_visible_windows() -> Vec<WindowServerInfo> {
        let options = CGWindowListOption(
            CGWindowListOption::OptionOnScreenOnly.0 | CGWindowListOption::ExcludeDesktopElements.0,
        );
        let Some(list) = (unsafe { CGWindowListCopyWindowInfo(options, 0) }) else {
            return Vec::new();
        };
        // Every element of the window list is a string-keyed dictionary.
        let list: CFRetained<CFArray<Entry>> = unsafe { CFRetained::cast_unchecked(list) };
        list.iter()
            .enumerate()
            .filter_map(|(idx, entry)| {
                let info = make_info(&entry);
                if info.is_none() {
                    trace!(idx, "Skipping malformed window list entry");
                }
                info
            })
            .collect()
    }

    fn number(entry: &Entry, key: &CFString) -> Option<CFRetained<CFNumber>> {
        entry.get(key)?.downcast::<CFNumber>().ok()
    }

    fn bounds(entry: &Entry) -> Option<Rect> {
        let value = entry.get(unsafe { kCGWindowBounds })?;
        let bounds = value.downcast::<CFDictionary>().ok()?;
        let bounds: CFRetained<Entry> = unsafe { CFRetained::cast_unchecked(bounds) };
        let field = |name: &str| number(&bounds, &CFString::from_str(name))?.as_f64();
        Some(Rect::new(field("X")?, field("Y")?, field("Width")?, field("Height")?))
    }

    fn make_info(entry: &Entry) -> Option<WindowServerInfo> {
        let id = number(entry, unsafe { kCGWindowNumber })?.as_i64()?;
        let pid = number(entry, unsafe { kCGWindowOwnerPID })?.as_i64()?;
        let layer = number(entry, unsafe { kCGWindowLayer })?.as_i64()?;
        let alpha = number(entry, unsafe { kCGWindowAlpha }).and_then(|n| n.as_f64()).unwrap_or(1.0);
        let owner_name = entry
            .get(unsafe { kCGWindowOwnerName })
            .and_then(|value| value.downcast::<CFString>().ok())
            .map(|name| name.to_string());

        Some(WindowServerInfo {
            id: WindowServerId(id.try_into().ok()?),
            pid: pid.try_into().ok()?,
            layer: layer.try_into().ok()?,
            alpha,
            frame: bounds(entry)?,
            owner_name,
        })
    }
}
