use core::fmt;
use spin::Mutex;

/// Log levels in order of severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    pub fn colored_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "\x1b[36mDEBUG\x1b[0m",
            LogLevel::Info => "\x1b[32mINFO\x1b[0m",
            LogLevel::Warn => "\x1b[33mWARN\x1b[0m",
            LogLevel::Error => "\x1b[31mERROR\x1b[0m",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.colored_str())
    }
}

const MAX_MODULE_FILTERS: usize = 16;

/// Per-module override of the default enable state. Module paths come from
/// `module_path!()`, so they are always `'static`.
#[derive(Debug, Clone, Copy)]
struct ModuleFilter {
    module: &'static str,
    enabled: bool,
}

pub struct Logger {
    level: LogLevel,
    filters: [Option<ModuleFilter>; MAX_MODULE_FILTERS],
    default_enabled: bool,
}

impl Logger {
    const fn new() -> Self {
        Self {
            level: crate::config::DEFAULT_LOG_LEVEL,
            filters: [None; MAX_MODULE_FILTERS],
            default_enabled: true,
        }
    }

    fn set_filter(&mut self, module: &'static str, enabled: bool) -> bool {
        if let Some(filter) = self.filters.iter_mut().flatten().find(|f| f.module == module) {
            filter.enabled = enabled;
            return true;
        }
        match self.filters.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(ModuleFilter { module, enabled });
                true
            }
            None => false,
        }
    }

    fn is_enabled(&self, level: LogLevel, module: &str) -> bool {
        if level < self.level {
            return false;
        }
        self.filters
            .iter()
            .flatten()
            .find(|f| f.module == module)
            .map_or(self.default_enabled, |f| f.enabled)
    }
}

static LOGGER: Mutex<Logger> = Mutex::new(Logger::new());

pub fn set_log_level(level: LogLevel) {
    LOGGER.lock().level = level;
}

pub fn log_level() -> LogLevel {
    LOGGER.lock().level
}

/// Set the enable state for modules without an explicit filter
pub fn set_default_module_enabled(enabled: bool) {
    LOGGER.lock().default_enabled = enabled;
}

/// Returns false when the filter table is full.
pub fn enable_module(module: &'static str) -> bool {
    LOGGER.lock().set_filter(module, true)
}

pub fn disable_module(module: &'static str) -> bool {
    LOGGER.lock().set_filter(module, false)
}

#[doc(hidden)]
pub fn __log(level: LogLevel, module: &str, args: fmt::Arguments) {
    // The filter lock is dropped before the console lock is taken.
    if !LOGGER.lock().is_enabled(level, module) {
        return;
    }
    crate::console::write_fmt(format_args!(
        "[\x1b[35mhart-{}\x1b[0m] [{}] [\x1b[34m{}\x1b[0m] {}\n",
        crate::arch::hart_id(),
        level,
        module,
        args
    ));
}

macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::log::__log($crate::log::LogLevel::Debug, module_path!(), format_args!($($arg)*))
    };
}

macro_rules! info {
    ($($arg:tt)*) => {
        $crate::log::__log($crate::log::LogLevel::Info, module_path!(), format_args!($($arg)*))
    };
}

macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::log::__log($crate::log::LogLevel::Warn, module_path!(), format_args!($($arg)*))
    };
}

macro_rules! error {
    ($($arg:tt)*) => {
        $crate::log::__log($crate::log::LogLevel::Error, module_path!(), format_args!($($arg)*))
    };
}

pub fn init(level: LogLevel) {
    set_log_level(level);
}

pub fn init_with_module_filter(level: LogLevel, default_enabled: bool) {
    set_log_level(level);
    set_default_module_enabled(default_enabled);
}
