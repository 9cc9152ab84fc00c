//! Accessibility trust. Every window read and write needs it.

use std::thread;
use std::time::{Duration, Instant};

use objc2_application_services::{AXIsProcessTrustedWithOptions, kAXTrustedCheckOptionPrompt};
use objc2_core_foundation::{CFBoolean, CFDictionary, CFString};
use tracing::{debug, info, warn};

const TRUST_RECHECK: Duration = Duration::from_millis(250);
const TRUST_WAIT: Duration = Duration::from_secs(30);

/// Asks the system whether this process is trusted, optionally showing the
/// system dialog that sends the user to the privacy settings.
fn check_trust(show_dialog: bool) -> bool {
    if !show_dialog {
        return unsafe { AXIsProcessTrustedWithOptions(None) };
    }
    let key: &CFString = unsafe { kAXTrustedCheckOptionPrompt };
    let options = CFDictionary::<CFString, CFBoolean>::from_slices(&[key], &[CFBoolean::new(true)]);
    unsafe { AXIsProcessTrustedWithOptions(Some(options.as_opaque())) }
}

pub fn is_trusted() -> bool { check_trust(false) }

/// Returns true once the process is trusted. If it is not, the system dialog
/// is shown once and trust is rechecked until [`TRUST_WAIT`] runs out.
pub fn ensure_accessibility_permission() -> bool {
    if check_trust(true) {
        return true;
    }

    info!("swapr is not trusted for accessibility yet, waiting for the user to allow it");
    let deadline = Instant::now() + TRUST_WAIT;
    while Instant::now() < deadline {
        thread::sleep(TRUST_RECHECK);
        if is_trusted() {
            info!("Accessibility access allowed");
            return true;
        }
        debug!("Still not trusted");
    }

    warn!(wait = ?TRUST_WAIT, "Accessibility access was not allowed in time");
    false
}
