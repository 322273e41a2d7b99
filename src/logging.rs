//! Logging handle handed to every component.
//!
//! Components never reach for the global `log` macros. They hold a [`Logger`],
//! which carries its own sink and target. The binary builds one on top of the
//! process-wide facade (set up by `env_logger`); tests pass a [`testing::Recorder`].

use std::fmt;
use std::sync::Arc;

use log::{Level, Log, Metadata, Record};

#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn Log>,
    target: &'static str,
}

/// Forwards to whatever logger is installed in the `log` facade.
struct Facade;
impl Log for Facade {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level() && log::logger().enabled(metadata)
    }
    fn log(&self, record: &Record) {
        log::logger().log(record)
    }
    fn flush(&self) {
        log::logger().flush()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Arc::new(Facade))
    }
}

impl Logger {
    pub fn new(sink: Arc<dyn Log>) -> Self {
        Self { sink, target: "mcholo" }
    }
    /// Same sink, different target.
    pub fn scoped(&self, target: &'static str) -> Self {
        Self { sink: Arc::clone(&self.sink), target }
    }
    pub fn target(&self) -> &'static str {
        self.target
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder().level(level).target(self.target).build();
        if self.sink.enabled(&metadata) {
            self.sink.log(&Record::builder().metadata(metadata).args(args).build());
        }
    }
    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args)
    }
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args)
    }
    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args)
    }
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("target", &self.target).finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Recorder;
    use log::Level;

    #[test]
    fn scoped_logger_keeps_sink() {
        let (recorder, log) = Recorder::logger();
        let scoped = log.scoped("mcholo::queue");
        scoped.warn(format_args!("queue for '{}' is busy", "lobby"));
        log.info(format_args!("hello"));
        assert_eq!(scoped.target(), "mcholo::queue");
        assert_eq!(recorder.count(Level::Warn), 1);
        assert_eq!(recorder.count(Level::Info), 1);
        assert!(recorder.contains("'lobby' is busy"));
    }
}
