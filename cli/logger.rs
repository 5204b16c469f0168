// Copyright 2018-2026 the esm.sh authors. MIT license.

//! A minimal stderr [`log::Log`] implementation, hand-rolled rather
//! than pulling in a full structured-logging stack for a single CLI
//! binary.

use log::LevelFilter;
use log::Metadata;
use log::Record;

struct StderrLogger;

impl log::Log for StderrLogger {
  fn enabled(&self, metadata: &Metadata) -> bool {
    metadata.level() <= log::max_level()
  }

  fn log(&self, record: &Record) {
    if !self.enabled(record.metadata()) {
      return;
    }
    eprintln!("{:<5} {}", record.level(), record.args());
  }

  fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

/// Installs the process-wide logger. `verbose` selects `Debug` level
/// over the default `Info`.
pub fn install(verbose: bool) {
  log::set_logger(&LOGGER).expect("logger already installed");
  log::set_max_level(if verbose {
    LevelFilter::Debug
  } else {
    LevelFilter::Info
  });
}
