//! `log` backend that writes whole lines to a [`Console`].

use core::fmt::{self, Write};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

use crate::traits::console::Console;

pub struct KernelLogger<C> {
    console: C,
    max_level: LevelFilter,
    // Serialises lines from different harts.
    lock: Mutex<()>,
}

impl<C: Console> KernelLogger<C> {
    pub const fn new(console: C, max_level: LevelFilter) -> Self {
        Self {
            console,
            max_level,
            lock: Mutex::new(()),
        }
    }

    pub fn max_level(&self) -> LevelFilter {
        self.max_level
    }
}

struct LineWriter<'a, C>(&'a C);

impl<C: Console> Write for LineWriter<'_, C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_bytes(s.as_bytes());
        Ok(())
    }
}

impl<C: Console + Send + Sync> Log for KernelLogger<C> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _guard = self.lock.lock();
        let _ = writeln!(
            LineWriter(&self.console),
            "[{:>5}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Installs `logger` as the global `log` backend.
pub fn init<C: Console + Send + Sync + 'static>(
    logger: &'static KernelLogger<C>,
) -> Result<(), SetLoggerError> {
    log::set_logger(logger)?;
    log::set_max_level(logger.max_level());
    Ok(())
}
