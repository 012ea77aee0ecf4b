//! systemd notification support
//!
//! Lets the agent run as a `Type=notify` unit when built with the `systemd`
//! feature; without it every call is a no-op.

/// Tell systemd the agent socket is bound and accepting.
///
/// Under `Type=notify` the unit only counts as started once this is sent.
#[cfg(feature = "systemd")]
pub fn notify_ready() {
    match sd_notify::notify(false, &[sd_notify::NotifyState::Ready]) {
        Ok(()) => log::debug!("Sent READY notification to systemd"),
        Err(e) => log::debug!("Failed to notify systemd (not running under systemd?): {}", e),
    }
}

#[cfg(not(feature = "systemd"))]
pub fn notify_ready() {
    log::debug!("systemd notify support not compiled in");
}

/// Update the status line shown by `systemctl status`
#[cfg(feature = "systemd")]
pub fn notify_status(status: &str) {
    match sd_notify::notify(false, &[sd_notify::NotifyState::Status(status)]) {
        Ok(()) => log::trace!("Updated systemd status: {}", status),
        Err(e) => log::trace!("Failed to update status: {}", e),
    }
}

#[cfg(not(feature = "systemd"))]
pub fn notify_status(_status: &str) {}

/// Tell systemd the agent is shutting down and its socket is going away
#[cfg(feature = "systemd")]
pub fn notify_stopping() {
    if let Err(e) = sd_notify::notify(false, &[sd_notify::NotifyState::Stopping]) {
        log::trace!("Failed to send STOPPING notification: {}", e);
    }
}

#[cfg(not(feature = "systemd"))]
pub fn notify_stopping() {}
