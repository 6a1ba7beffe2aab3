pub mod constants;
pub(crate) mod defaults;
pub mod models;
pub mod utils;

pub use models::*;
pub use utils::*;

#[cfg(not(test))]
use std::sync::OnceLock;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Value of the `User-Agent` header sent on REST and websocket requests.
pub fn user_agent() -> String {
    format!("{}/{}", APP_NAME, VERSION)
}

pub fn version() -> String {
    format!("{} {}", APP_NAME, VERSION)
}

/// Process wide configuration, set once at startup by `Configuration::init`.
#[cfg(not(test))]
static CONFIG: OnceLock<Configuration> = OnceLock::new();

// Tests run in parallel, so each thread carries its own configuration.
#[cfg(test)]
thread_local! {
    static TEST_CONFIG: std::cell::RefCell<&'static Configuration> =
        std::cell::RefCell::new(Box::leak(Box::new(Configuration::default())));
}

/// Prints startup progress to stderr when `general.verbose` is set.
#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => {
        if $crate::config::Configuration::instance().general.verbose {
            eprintln!($($arg)*);
        }
    };
}

pub use verbose;
