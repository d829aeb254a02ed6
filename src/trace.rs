//! Stderr tracing for the switching layer, compiled in by the `trace` feature.
//!
//! The interesting failures here (lost wakeups, a transfer into the wrong record,
//! a thread that never came up) happen below the level a debugger steps through
//! comfortably, so every backend logs its lifecycle events directly to stderr when
//! the feature is on, and the thread-backed backend additionally logs each handoff.
//! Without the feature the macro expands to nothing.

macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "trace")]
        {
            eprintln!("handoff: {}", format_args!($($arg)*));
        }
    };
}

pub(crate) use trace;
