//! Console output shared by all harts.
//!
//! The HAL does not own a UART driver. Firmware registers a [`ConsoleSink`]
//! once (HTIF, 16550, simulator port, ...) and every hart writes through it
//! under the architecture lock so lines from different harts do not
//! interleave.

use core::fmt::{self, Write};
use spin::Once;

use crate::sync::{ArchLock, RawLock, SpinLock};

pub trait ConsoleSink: Sync {
    fn put_str(&self, s: &str);
}

static SINK: Once<&'static dyn ConsoleSink> = Once::new();
static CONSOLE_LOCK: SpinLock<()> = SpinLock::new(());

/// Install the console backend. Only the first registration takes effect.
pub fn register(sink: &'static dyn ConsoleSink) {
    SINK.call_once(|| sink);
}

pub fn is_registered() -> bool {
    SINK.is_completed()
}

struct ConsoleWriter(&'static dyn ConsoleSink);

impl Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.put_str(s);
        Ok(())
    }
}

pub fn write_fmt(args: fmt::Arguments) {
    let Some(sink) = SINK.get() else {
        return;
    };
    // A lock that excludes nobody cannot be waited on; a nested print
    // (trap handler) goes out unserialized.
    let _guard = if ArchLock::EXCLUSIVE {
        Some(CONSOLE_LOCK.lock())
    } else {
        CONSOLE_LOCK.try_lock()
    };
    let _ = ConsoleWriter(*sink).write_fmt(args);
}

pub fn write_str(s: &str) {
    write_fmt(format_args!("{}", s));
}

/// The lock serializing console output, for drivers that must keep
/// multi-byte transactions with the host together.
pub fn lock() -> &'static SpinLock<(), ArchLock> {
    &CONSOLE_LOCK
}
