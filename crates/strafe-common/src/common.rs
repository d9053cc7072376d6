// common.rs — console print sinks shared by every subsystem

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

// ============================================================
// Redirect buffer
// ============================================================

static RD_BUFFER: Mutex<Option<String>> = Mutex::new(None);

/// Begin capturing print output into a buffer instead of stdout.
pub fn com_begin_redirect() {
    let mut buf = RD_BUFFER.lock().unwrap();
    *buf = Some(String::new());
}

/// End capture and return everything printed since the begin call.
pub fn com_end_redirect() -> Option<String> {
    let mut buf = RD_BUFFER.lock().unwrap();
    buf.take()
}

// ============================================================
// Print sinks
// ============================================================

/// General-purpose print. Appends to the redirect buffer if one is
/// active, otherwise writes to stdout.
pub fn com_printf(msg: &str) {
    {
        let mut buf = RD_BUFFER.lock().unwrap();
        if let Some(ref mut s) = *buf {
            s.push_str(msg);
            return;
        }
    }
    print!("{}", msg);
}

/// Warning print. Same sink as com_printf with a WARNING prefix.
pub fn com_wprintf(msg: &str) {
    com_printf(&format!("WARNING: {}", msg));
}

static DEVELOPER: AtomicBool = AtomicBool::new(false);

pub fn com_set_developer(on: bool) {
    DEVELOPER.store(on, Ordering::Relaxed);
}

/// Developer-only print; dropped unless the developer flag is set.
pub fn com_dprintf(msg: &str) {
    if !DEVELOPER.load(Ordering::Relaxed) {
        return;
    }
    com_printf(msg);
}

// ============================================================
// Tests
// ============================================================
