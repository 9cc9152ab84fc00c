use objc2::msg_send;
use objc2::rc::Retained;
use objc2_app_kit::{NSApplicationActivationPolicy, NSRunningApplication, NSWorkspace};
use objc2_foundation::NSString;

use super::system::RunningApp;
use super::window_server::pid_t;

pub fn running_apps() -> Vec<RunningApp> {
    NSWorkspace::sharedWorkspace()
        .runningApplications()
        .into_iter()
        .filter(|app| !app.isTerminated())
        .map(|app| RunningApp {
            pid: app.pid(),
            name: app.localized_name().as_deref().map(ToString::to_string),
            regular: app.activationPolicy() == NSApplicationActivationPolicy::Regular,
        })
        .collect()
}

pub trait NSRunningApplicationExt {
    fn pid(&self) -> pid_t;
    fn localized_name(&self) -> Option<Retained<NSString>>;
}

impl NSRunningApplicationExt for NSRunningApplication {
    fn pid(&self) -> pid_t { unsafe { msg_send![self, processIdentifier] } }

    fn localized_name(&self) -> Option<Retained<NSString>> { self.localizedName() }
}
