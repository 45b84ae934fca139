//! Simple, macOS-only permission checks for vnkey.
//!
//! The event tap needs Input Monitoring to observe keystrokes and
//! Accessibility to post synthesized ones. Losing Accessibility while the tap
//! is running is what drives the tap manager into its fail-open state.
//!
//! There is no prompting logic here: the host is responsible for guiding the
//! user to System Settings if permissions are missing. On other platforms
//! every probe reports `false`.
//!
//! All calls are fast and side‑effect free.
use serde::{Deserialize, Serialize};

#[cfg(target_os = "macos")]
#[link(name = "ApplicationServices", kind = "framework")]
unsafe extern "C" {
    fn AXIsProcessTrusted() -> bool;
    fn CGPreflightListenEventAccess() -> bool;
}

/// Check if the process is trusted for Accessibility.
pub fn accessibility_ok() -> bool {
    #[cfg(target_os = "macos")]
    {
        unsafe { AXIsProcessTrusted() }
    }
    #[cfg(not(target_os = "macos"))]
    {
        false
    }
}

/// Check if the application has the "Input Monitoring" permission.
///
/// Returns `true` when the process is allowed to listen for keyboard events
/// (CGEvent tap), and `false` otherwise.
pub fn input_monitoring_ok() -> bool {
    #[cfg(target_os = "macos")]
    {
        unsafe { CGPreflightListenEventAccess() }
    }
    #[cfg(not(target_os = "macos"))]
    {
        false
    }
}

/// Current permission status for the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsStatus {
    /// Accessibility (AX) permission; `true` if granted.
    pub accessibility_ok: bool,
    /// Input Monitoring permission; `true` if granted.
    pub input_ok: bool,
}

impl PermissionsStatus {
    /// True when both permissions needed by the event tap are granted.
    pub fn all_granted(&self) -> bool {
        self.accessibility_ok && self.input_ok
    }
}

/// Query both Accessibility and Input Monitoring permissions.
///
/// This is a convenience wrapper over [`accessibility_ok`] and
/// [`input_monitoring_ok`]. The function performs no prompting and has no
/// side effects.
pub fn check_permissions() -> PermissionsStatus {
    PermissionsStatus {
        accessibility_ok: accessibility_ok(),
        input_ok: input_monitoring_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_granted_requires_both() {
        let s = PermissionsStatus {
            accessibility_ok: true,
            input_ok: false,
        };
        assert!(!s.all_granted());
        let s = PermissionsStatus {
            accessibility_ok: true,
            input_ok: true,
        };
        assert!(s.all_granted());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn probes_report_false_off_macos() {
        assert_eq!(
            check_permissions(),
            PermissionsStatus {
                accessibility_ok: false,
                input_ok: false
            }
        );
    }
}
