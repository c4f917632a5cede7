use log;

/// Customize logger
pub struct Logger;

static LOGGER: Logger = Logger;

impl Logger {
    /// Install logger
    ///
    /// Log level defaults to `Info` and can be overridden with the
    /// `WORKPOOL_LOG` environment variable (`error`/`warn`/`info`/`debug`/`trace`).
    pub fn init() -> Result<(), log::SetLoggerError> {
        log::set_logger(&LOGGER).map(|()| log::set_max_level(max_level()))
    }
}

fn max_level() -> log::LevelFilter {
    match std::env::var("WORKPOOL_LOG").as_deref() {
        Ok("error") => log::LevelFilter::Error,
        Ok("warn") => log::LevelFilter::Warn,
        Ok("debug") => log::LevelFilter::Debug,
        Ok("trace") => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}|{}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}
