use std::{backtrace, panic};

use tracing::error;

/// Reports panics through `tracing`, with a captured backtrace.
pub fn init() {
    panic::set_hook(Box::new(|info| {
        let backtrace = backtrace::Backtrace::force_capture();
        error!("{info}\n\n{backtrace}");
    }));
}
