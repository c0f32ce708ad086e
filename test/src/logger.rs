//! A logger for tests.
use std::io;

use chrono::prelude::*;
use colored::*;
use log::{Level, Log, Metadata, Record};

struct Logger {
    level: Level,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let target = if record.target().is_empty() {
            record.module_path().unwrap_or_default()
        } else {
            record.target()
        };
        let level = match record.level() {
            Level::Error => record.level().to_string().red(),
            Level::Warn => record.level().to_string().yellow(),
            Level::Info => record.level().to_string().green(),
            Level::Debug => record.level().to_string().white(),
            Level::Trace => record.level().to_string().white().dimmed(),
        };
        let line = format!(
            "test> {} {:<5} {} {}",
            Local::now()
                .to_rfc3339_opts(SecondsFormat::Millis, true)
                .white(),
            level,
            target.bold(),
            record.args()
        );

        if record.level() == Level::Error {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }

    fn flush(&self) {
        use io::Write as _;

        io::stdout().flush().ok();
    }
}

/// Install the test logger. Only the first call in a process has any effect.
pub fn init(level: Level) {
    let logger = Logger { level };

    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(level.to_level_filter());
    }
}
