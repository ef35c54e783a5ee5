//! Crash point injection for recovery testing
//!
//! When `RFSQ_CRASH_POINT` names one of the points below, the process
//! terminates via `std::process::abort()` when it reaches that point: no
//! cleanup, no unwinding.
//!
//! ```bash
//! RFSQ_CRASH_POINT=create_after_enforce rootfs-quota --config ./config.json
//! ```

use std::sync::OnceLock;

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn get_crash_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var("RFSQ_CRASH_POINT").ok())
        .as_deref()
}

/// Returns true if `RFSQ_CRASH_POINT` equals `name`.
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    get_crash_point().map(|p| p == name).unwrap_or(false)
}

/// Abort the process if the named crash point is enabled.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    // Creation sequence
    pub const CREATE_AFTER_ALLOCATE: &str = "create_after_allocate";
    pub const CREATE_AFTER_ENFORCE: &str = "create_after_enforce";
    pub const CREATE_AFTER_PERSIST: &str = "create_after_persist";

    // Deletion sequence
    pub const DELETE_AFTER_CLEAR: &str = "delete_after_clear";
    pub const DELETE_AFTER_REMOVE: &str = "delete_after_remove";

    // State document
    pub const STATE_BEFORE_RENAME: &str = "state_before_rename";

    pub fn all() -> &'static [&'static str] {
        &[
            CREATE_AFTER_ALLOCATE,
            CREATE_AFTER_ENFORCE,
            CREATE_AFTER_PERSIST,
            DELETE_AFTER_CLEAR,
            DELETE_AFTER_REMOVE,
            STATE_BEFORE_RENAME,
        ]
    }
}
