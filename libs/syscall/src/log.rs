use alloc::boxed::Box;
use core::fmt;
use log::{LevelFilter, Log, SetLoggerError};
use spin::Mutex;

static WRITER: Mutex<Option<Box<dyn fmt::Write + Send>>> = Mutex::new(None);

pub struct UserLogger;

static LOGGER: UserLogger = UserLogger;

impl UserLogger {
    /// Route `log` records to `writer`, keeping those at `level` or above.
    ///
    /// Fails if a logger is already installed; the existing sink is kept.
    pub fn init(
        writer: Box<dyn fmt::Write + Send>,
        level: LevelFilter,
    ) -> Result<(), SetLoggerError> {
        log::set_logger(&LOGGER)?;
        *WRITER.lock() = Some(writer);
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for UserLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    #[inline]
    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut writer = WRITER.lock();
        if let Some(writer) = writer.as_mut() {
            // A failing sink has nowhere to report to.
            let _ = writeln!(writer, "[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}
