//! Report output.
//!
//! Per-packet latency lines and the final summary are the program's output
//! proper and go to stdout; diagnostics go through `tracing` to stderr.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use crate::core::Report;
use crate::transport::{MonotonicClock, format_timestamp};

/// Report lines on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutReport;

impl Report for StdoutReport {
    fn line(&mut self, line: &str) {
        let mut out = io::stdout().lock();
        // Nothing useful to do if stdout is gone.
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

/// Report lines kept in memory, shared with the caller.
#[derive(Debug, Default, Clone)]
pub struct CapturedLines(Rc<RefCell<Vec<String>>>);

impl CapturedLines {
    /// Copy of every line so far.
    pub fn lines(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

impl Report for CapturedLines {
    fn line(&mut self, line: &str) {
        self.0.borrow_mut().push(line.to_string());
    }
}

/// Report sink plus the `-q` and `-T` output settings.
pub struct Printer {
    quiet: bool,
    timestamps: Option<MonotonicClock>,
    sink: Box<dyn Report>,
}

impl Printer {
    /// Printer writing to `sink`. With a `timestamps` clock every per-packet
    /// line is prefixed with its wall-clock time.
    pub fn new(quiet: bool, timestamps: Option<MonotonicClock>, sink: Box<dyn Report>) -> Self {
        Self {
            quiet,
            timestamps,
            sink,
        }
    }

    /// Printer keeping its lines in memory.
    pub fn captured(quiet: bool) -> (Self, CapturedLines) {
        let lines = CapturedLines::default();
        (Self::new(quiet, None, Box::new(lines.clone())), lines)
    }

    /// Check if per-packet lines are suppressed.
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Per-packet line about an event at local time `when`.
    pub fn packet_line(&mut self, when: u32, text: &str) {
        match &self.timestamps {
            Some(clock) => {
                let stamp = format_timestamp(clock.expand(when));
                self.sink.line(&format!("{stamp} {text}"));
            }
            None => self.sink.line(text),
        }
    }

    /// Line printed as-is, even in quiet mode.
    pub fn plain(&mut self, text: &str) {
        self.sink.line(text);
    }
}

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Printer")
            .field("quiet", &self.quiet)
            .field("timestamps", &self.timestamps.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_lines() {
        let (mut printer, lines) = Printer::captured(false);
        printer.packet_line(1, "one");
        printer.plain("two");
        assert_eq!(lines.lines(), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_timestamp_prefix() {
        let lines = CapturedLines::default();
        let clock = MonotonicClock::new();
        let mut printer = Printer::new(false, Some(clock), Box::new(lines.clone()));
        printer.packet_line(clock.now(), "x");
        let line = &lines.lines()[0];
        // HH:MM:SS.uuuuuu x
        assert_eq!(line.len(), 15 + 2);
        assert_eq!(&line[2..3], ":");
        assert_eq!(&line[8..9], ".");
        assert!(line.ends_with(" x"));
    }
}
