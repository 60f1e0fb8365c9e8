//! `log` sink installed inside the simulator process.
//!
//! Records go to stderr as `<sim time> <LEVEL> <target> <message>`, or to a
//! handler supplied by the embedding runtime once it is up.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Receives formatted records: level, target, message.
pub type LogHandler = Box<dyn Fn(Level, &str, &str) + Send + Sync>;

/// Sink for the `log` facade.
pub struct GpiLogger {
    handler: RwLock<Option<LogHandler>>,
    sim_time: AtomicU64,
}

static LOGGER: GpiLogger = GpiLogger {
    handler: RwLock::new(None),
    sim_time: AtomicU64::new(0),
};

impl Log for GpiLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        if let Ok(handler) = self.handler.read() {
            if let Some(handler) = handler.as_ref() {
                handler(record.level(), record.target(), &message);
                return;
            }
        }
        let _ = writeln!(
            std::io::stderr().lock(),
            "{:>12} {:<5} {} {}",
            self.sim_time.load(Ordering::Relaxed),
            record.level(),
            record.target(),
            message
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Installs the sink and sets the maximum level.
///
/// Installing twice only adjusts the level; a foreign logger that got there
/// first (a test harness, say) is left in place.
pub fn init(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_err() {
        log::debug!("a logger is already installed; keeping it");
    }
    log::set_max_level(level);
}

/// Routes records to `handler` instead of stderr.
pub fn set_handler(handler: LogHandler) {
    if let Ok(mut slot) = LOGGER.handler.write() {
        *slot = Some(handler);
    }
}

/// Restores stderr output.
pub fn clear_handler() {
    if let Ok(mut slot) = LOGGER.handler.write() {
        *slot = None;
    }
}

/// Stamps subsequent records with the current simulation time.
pub(crate) fn set_sim_time(time: u64) {
    LOGGER.sim_time.store(time, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn test_handler_receives_formatted_records() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        set_handler(Box::new(move |level, target, message| {
            sink.lock().unwrap().push(format!("{level} {target} {message}"));
        }));
        log::set_max_level(LevelFilter::Trace);
        LOGGER.log(
            &Record::builder()
                .level(Level::Warn)
                .target("gpi::test")
                .args(format_args!("slot {} busy", 3))
                .build(),
        );
        clear_handler();
        assert!(seen
            .lock()
            .unwrap()
            .iter()
            .any(|line| line == "WARN gpi::test slot 3 busy"));
    }
}
