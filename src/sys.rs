//! Utilities for interfacing with OS-specific APIs.

pub mod app_cache;
pub mod error;
pub mod geometry;
pub mod system;
pub mod window_server;

#[cfg(target_os = "macos")]
pub mod accessibility;
#[cfg(target_os = "macos")]
pub mod actual;
#[cfg(target_os = "macos")]
pub mod app;
#[cfg(target_os = "macos")]
pub mod axuielement;

#[cfg(test)]
pub(crate) mod testing;

pub use error::AxError;
pub use system::{RunningApp, System};
