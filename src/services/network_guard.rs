//! Process-global switch between the offline "traditional" mode and AI mode.
//!
//! The flag is mirrored from settings at startup and on every settings
//! update; the AI provider checks it before opening any connection, so no
//! network request can be issued while the app is in traditional mode.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::AppMode;

static NETWORK_ALLOWED: AtomicBool = AtomicBool::new(false);

pub fn apply_mode(mode: AppMode) {
    NETWORK_ALLOWED.store(mode.is_ai(), Ordering::Relaxed);
}

pub fn network_allowed() -> bool {
    NETWORK_ALLOWED.load(Ordering::Relaxed)
}

pub fn ensure_network_allowed() -> Result<(), String> {
    if network_allowed() {
        Ok(())
    } else {
        Err("Network access is disabled in traditional mode".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial(network_guard)]
    fn mode_controls_network_access() {
        apply_mode(AppMode::Traditional);
        assert!(!network_allowed());
        assert!(ensure_network_allowed().is_err());

        apply_mode(AppMode::Ai);
        assert!(network_allowed());
        assert!(ensure_network_allowed().is_ok());

        apply_mode(AppMode::Traditional);
        assert!(ensure_network_allowed().is_err());
    }
}
