//! Macros to support trace logging of sabre.
//!
//! To enable logging support, compile the library with the `trace_log`
//! feature, i.e. `cargo build --features trace_log`.
//!
//! The consumer should also import the `env_logger` and `log` crates and
//! initialize `env_logger` through `env_logger::init()`.

#[macro_export]
macro_rules! sabre_trace {
    ($t: expr) => ({
        if cfg!(feature = "trace_log") {
            #[cfg(feature="trace_log")]
            debug!("{}", $t.to_string());
        }
    });
    ($fmt:expr, $($arg:tt)*) => ({
        if cfg!(feature = "trace_log") {
            #[cfg(feature="trace_log")]
            debug!("{}", format_args!($fmt, $($arg)*));
        }
    });
}

#[macro_export]
macro_rules! sabre_warn {
    ($t: expr) => ({
        if cfg!(feature = "trace_log") {
            #[cfg(feature="trace_log")]
            warn!("{}", $t.to_string());
        } else {
            let _ = &$t;
        }
    });
    ($fmt:expr, $($arg:tt)*) => ({
        if cfg!(feature = "trace_log") {
            #[cfg(feature="trace_log")]
            warn!("{}", format_args!($fmt, $($arg)*));
        }
    });
}

#[macro_export]
macro_rules! sabre_err {
    ($t: expr) => ({
        if cfg!(feature = "trace_log") {
            #[cfg(feature="trace_log")]
            error!("{}", $t.to_string());
        } else {
            let _ = &$t;
        }
    });
    ($fmt:expr, $($arg:tt)*) => ({
        if cfg!(feature = "trace_log") {
            #[cfg(feature="trace_log")]
            error!("{}", format_args!($fmt, $($arg)*));
        }
    });
}
