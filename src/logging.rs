use log::{info, LevelFilter};
use std::env;

pub const UI_NAMESPACE: &str = "desktop_clock::ui";
pub const TIMER_NAMESPACE: &str = "desktop_clock::timer";
pub const SETTINGS_NAMESPACE: &str = "desktop_clock::settings";
pub const CONTROL_NAMESPACE: &str = "desktop_clock::control";

const NAMESPACES: [&str; 4] = [UI_NAMESPACE, TIMER_NAMESPACE, SETTINGS_NAMESPACE, CONTROL_NAMESPACE];

pub fn init_logging() {
    // Set default log level if not specified in environment
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "info");
        }
    }

    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    builder
        .format_timestamp_millis()
        .format_module_path(true)
        .format_target(true);

    // Repaint ticks log at trace; our namespaces are pinned to debug.
    for namespace in NAMESPACES {
        builder.filter(Some(namespace), LevelFilter::Debug);
    }
    builder.init();

    info!("Logging initialized for {}", env!("CARGO_PKG_NAME"));
}

// Convenience macros for each namespace
#[macro_export]
macro_rules! ui_log {
    ($($arg:tt)*) => {
        log::log!(target: $crate::logging::UI_NAMESPACE, $($arg)*)
    };
}

#[macro_export]
macro_rules! timer_log {
    ($($arg:tt)*) => {
        log::log!(target: $crate::logging::TIMER_NAMESPACE, $($arg)*)
    };
}

#[macro_export]
macro_rules! settings_log {
    ($($arg:tt)*) => {
        log::log!(target: $crate::logging::SETTINGS_NAMESPACE, $($arg)*)
    };
}

#[macro_export]
macro_rules! control_log {
    ($($arg:tt)*) => {
        log::log!(target: $crate::logging::CONTROL_NAMESPACE, $($arg)*)
    };
}
