//! Owned wrapper over an accessibility element.

use std::ffi::c_void;
use std::ptr::{self, NonNull};

use objc2_application_services::{AXError, AXUIElement as AxElement, AXValue, AXValueType};
use objc2_core_foundation::{
    CFArray, CFBoolean, CFNumber, CFRetained, CFString, CFType, CGPoint, CGSize,
};

use super::error::AxError;
use super::geometry::{Point, Rect, Size};
use super::window_server::{WindowServerId, pid_t};

pub const AX_WINDOW_ROLE: &str = "AXWindow";

const kAXWindowsAttribute: &str = "AXWindows";
const kAXPositionAttribute: &str = "AXPosition";
const kAXSizeAttribute: &str = "AXSize";
const kAXTitleAttribute: &str = "AXTitle";
const kAXRoleAttribute: &str = "AXRole";
const kAXMinimizedAttribute: &str = "AXMinimized";
const kAXParentAttribute: &str = "AXParent";
const kAXWindowAttribute: &str = "AXWindow";

#[link(name = "ApplicationServices", kind = "framework")]
unsafe extern "C" {
    /// Private, but the only direct route from an element to its window id.
    fn _AXUIElementGetWindow(element: &AxElement, id: *mut u32) -> AXError;
}

/// An accessibility element. Equality and hashing are element identity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AXUIElement(CFRetained<AxElement>);

impl AXUIElement {
    pub fn application(pid: pid_t) -> Self { AXUIElement(unsafe { AxElement::new_application(pid) }) }

    pub fn system_wide() -> Self { AXUIElement(unsafe { AxElement::new_system_wide() }) }

    fn copy_attribute(&self, attribute: &str) -> Result<CFRetained<CFType>, AxError> {
        let name = CFString::from_str(attribute);
        let mut value: *const CFType = ptr::null();
        AxError::check(unsafe { self.0.copy_attribute_value(&name, NonNull::from(&mut value)) })?;
        NonNull::new(value.cast_mut())
            .map(|value| unsafe { CFRetained::from_raw(value) })
            .ok_or(AxError::NoValue)
    }

    fn set_attribute(&self, attribute: &str, value: &CFType) -> Result<(), AxError> {
        let name = CFString::from_str(attribute);
        AxError::check(unsafe { self.0.set_attribute_value(&name, value) })
    }

    fn element_attribute(&self, attribute: &str) -> Result<AXUIElement, AxError> {
        let value = self.copy_attribute(attribute)?;
        value.downcast::<AxElement>().map(AXUIElement).map_err(|_| AxError::NotFound)
    }

    fn string_attribute(&self, attribute: &str) -> Result<String, AxError> {
        let value = self.copy_attribute(attribute)?;
        let string = value.downcast_ref::<CFString>().ok_or(AxError::NotFound)?;
        Ok(string.to_string())
    }

    pub fn number_attribute(&self, attribute: &str) -> Result<i64, AxError> {
        let value = self.copy_attribute(attribute)?;
        value.downcast_ref::<CFNumber>().and_then(CFNumber::as_i64).ok_or(AxError::NotFound)
    }

    pub fn windows(&self) -> Result<Vec<AXUIElement>, AxError> {
        let value = self.copy_attribute(kAXWindowsAttribute)?;
        let array = value.downcast::<CFArray>().map_err(|_| AxError::NotFound)?;
        // The windows attribute always holds elements.
        let array: CFRetained<CFArray<AxElement>> = unsafe { CFRetained::cast_unchecked(array) };
        Ok(array.iter().map(AXUIElement).collect())
    }

    fn ax_value<T: Default>(&self, attribute: &str, kind: AXValueType) -> Result<T, AxError> {
        let value = self.copy_attribute(attribute)?;
        let value = value.downcast_ref::<AXValue>().ok_or(AxError::NotFound)?;
        let mut out = T::default();
        let ok = unsafe { value.value(kind, NonNull::from(&mut out).cast::<c_void>()) };
        if !ok {
            return Err(AxError::NotFound);
        }
        Ok(out)
    }

    fn set_ax_value<T>(&self, attribute: &str, kind: AXValueType, raw: T) -> Result<(), AxError> {
        let value = unsafe { AXValue::new(kind, NonNull::from(&raw).cast::<c_void>()) }
            .ok_or(AxError::CannotComplete)?;
        self.set_attribute(attribute, &value)
    }

    pub fn position(&self) -> Result<Point, AxError> {
        self.ax_value::<CGPoint>(kAXPositionAttribute, AXValueType::CGPoint).map(Into::into)
    }

    pub fn size(&self) -> Result<Size, AxError> {
        self.ax_value::<CGSize>(kAXSizeAttribute, AXValueType::CGSize).map(Into::into)
    }

    pub fn frame(&self) -> Result<Rect, AxError> {
        Ok(Rect::from_parts(self.position()?, self.size()?))
    }

    pub fn title(&self) -> Result<String, AxError> { self.string_attribute(kAXTitleAttribute) }

    pub fn role(&self) -> Result<String, AxError> { self.string_attribute(kAXRoleAttribute) }

    pub fn minimized(&self) -> Result<bool, AxError> {
        let value = self.copy_attribute(kAXMinimizedAttribute)?;
        value.downcast_ref::<CFBoolean>().map(CFBoolean::as_bool).ok_or(AxError::NotFound)
    }

    pub fn parent(&self) -> Result<AXUIElement, AxError> {
        self.element_attribute(kAXParentAttribute)
    }

    pub fn window(&self) -> Result<AXUIElement, AxError> {
        self.element_attribute(kAXWindowAttribute)
    }

    pub fn pid(&self) -> Result<pid_t, AxError> {
        let mut pid: pid_t = 0;
        AxError::check(unsafe { self.0.pid(NonNull::from(&mut pid)) })?;
        Ok(pid)
    }

    pub fn window_id(&self) -> Result<WindowServerId, AxError> {
        let mut id = 0;
        AxError::check(unsafe { _AXUIElementGetWindow(&self.0, &mut id) })?;
        if id == 0 {
            return Err(AxError::NoValue);
        }
        Ok(WindowServerId::new(id))
    }

    pub fn set_position(&self, position: Point) -> Result<(), AxError> {
        self.set_ax_value(kAXPositionAttribute, AXValueType::CGPoint, CGPoint::from(position))
    }

    pub fn set_size(&self, size: Size) -> Result<(), AxError> {
        self.set_ax_value(kAXSizeAttribute, AXValueType::CGSize, CGSize::from(size))
    }

    /// Hit test; only meaningful on the system-wide element.
    pub fn element_at(&self, point: Point) -> Result<AXUIElement, AxError> {
        let mut out: *const AxElement = ptr::null();
        AxError::check(unsafe {
            self.0.copy_element_at_position(point.x as f32, point.y as f32, NonNull::from(&mut out))
        })?;
        NonNull::new(out.cast_mut())
            .map(|element| AXUIElement(unsafe { CFRetained::from_raw(element) }))
            .ok_or(AxError::InvalidElement)
    }
}

impl std::fmt::Debug for AXUIElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.role(), self.pid()) {
            (Ok(role), Ok(pid)) => write!(f, "AXUIElement({role}, pid {pid})"),
            _ => write!(f, "AXUIElement({:p})", CFRetained::as_ptr(&self.0)),
        }
    }
}
