//! Session-scoped logging for the hot loops (tick clock, sensing loop).
//!
//! Each module using the macro defines its own switch:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::session_log;
//!
//! session_log!(info, session_id, "captured frame in {}ms", elapsed);
//! ```
//! which logs `[session <id>] captured frame in 12ms` at the given level.

#[macro_export]
macro_rules! session_log {
    ($level:ident, $session:expr, $($arg:tt)+) => {
        if ENABLE_LOGS {
            log::$level!("[session {}] {}", $session, format_args!($($arg)+));
        }
    };
}
