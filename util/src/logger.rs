//! Generic logger utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use log::{self, info};
use colored::{ColoredString, Colorize};
use std::time::{Duration, Instant};
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Gate for repetitive log lines.
///
/// A hot loop which can fail on every iteration (a socket send, a bus read) should only report
/// once per interval. The limiter counts how many events were suppressed since the last time it
/// opened so the report can mention them.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_open: Option<Instant>,
    suppressed: u64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level less than `INFO`, found `{0}`")]
    InvalidMinLogLevel(log::LevelFilter),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RateLimiter {
    /// Create a new limiter which opens at most once every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_open: None,
            suppressed: 0
        }
    }

    /// Record an event at the current time.
    ///
    /// Returns `Some(n)` if the event should be logged, where `n` is the number of events that
    /// were suppressed since the last logged one, or `None` if this event should be dropped.
    pub fn check(&mut self) -> Option<u64> {
        self.check_at(Instant::now())
    }

    /// Record an event at the given instant. See [`RateLimiter::check`].
    pub fn check_at(&mut self, now: Instant) -> Option<u64> {
        let open = match self.last_open {
            Some(t) => now.saturating_duration_since(t) >= self.interval,
            None => true
        };

        if open {
            self.last_open = Some(now);
            let suppressed = self.suppressed;
            self.suppressed = 0;
            Some(suppressed)
        }
        else {
            self.suppressed += 1;
            None
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// # Notes
///
/// - `min_level` must be greater than `log::Level::Info`.
///
/// # Safety
///
/// - This function must only be called once to prevent corrupting logs.
pub fn logger_init(
    min_level: self::LevelFilter,
    session: &session::Session
) -> Result<(), LoggerInitError> {

    if min_level < log::Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level))
    }

    // Setup the logger using fern's builder pattern
    match fern::Dispatch::new()
        .format(|out, message, record| {

            // If debug or trace include the target, otherwise don't include it
            if record.level() > log::Level::Info {
                out.finish(format_args!(
                    "[{:10.6} {}] {}: {}",
                    session::get_elapsed_seconds(),
                    level_to_str(record.level()),
                    record.target(),
                    message
                ))
            }
            else {
                out.finish(format_args!(
                    "[{:10.6} {}] {}",
                    session::get_elapsed_seconds(),
                    level_to_str(record.level()),
                    message
                ))
            }

        })
        .level(min_level)
        // The PWM board driver is chatty at trace level
        .level_for("pwm_pca9685", LevelFilter::Info)
        .chain(std::io::stdout())
        .chain(match fern::log_file(session.log_file_path.clone()) {
            Ok(f) => f,
            Err(e) => return Err(LoggerInitError::LogFileInitError(e))
        })
        .apply() {
            Ok(_) => (),
            Err(e) => return Err(LoggerInitError::FernInitError(e))
        };

    info!("Logging initialised");
    if let Some(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Log level: {:?}", min_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the string representation of a log level
fn level_to_str(level: log::Level) -> ColoredString {
    match level {
        log::Level::Trace => "TRC".dimmed().italic(),
        log::Level::Debug => "DBG".dimmed(),
        log::Level::Info  => "INF".normal(),
        log::Level::Warn  => "WRN".yellow(),
        log::Level::Error => "ERR".red().bold()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rate_limiter_opens_once_per_interval() {
        let mut limiter = RateLimiter::new(Duration::from_secs(5));
        let t0 = Instant::now();

        assert_eq!(limiter.check_at(t0), Some(0));
        assert_eq!(limiter.check_at(t0 + Duration::from_secs(1)), None);
        assert_eq!(limiter.check_at(t0 + Duration::from_secs(4)), None);

        // Two events were dropped in between
        assert_eq!(limiter.check_at(t0 + Duration::from_secs(5)), Some(2));
        assert_eq!(limiter.check_at(t0 + Duration::from_secs(6)), None);
    }
}
