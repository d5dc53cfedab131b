//! Session transcript and debug instrumentation.
//!
//! Every send and expect is recorded with a timestamp relative to the
//! shared run start and the caller's file:line. When debugging is
//! enabled, sends and expects are mirrored to stdout in bold, and (at
//! the verbose level) incoming bytes are mirrored in a per-device color
//! while the recorded transcript stays raw.

use std::fmt;
use std::panic::Location;
use std::time::{Duration, Instant};

use owo_colors::{AnsiColors, OwoColorize};

use crate::config::DebugLevel;

/// The file:line of the test code that invoked a session method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub file: &'static str,
    pub line: u32,
}

impl Caller {
    /// Capture the caller of the enclosing `#[track_caller]` function.
    #[track_caller]
    pub fn here() -> Self {
        let location = Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Direction of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes written to the device.
    Send,
    /// Bytes read from the device.
    Recv,
    /// An expect was started.
    Expect,
    /// An expect matched.
    Match,
    /// Free-form annotation.
    Note,
}

/// One transcript record.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    /// Seconds since the shared run start.
    pub at: Duration,
    /// Caller location, where one was captured.
    pub caller: Option<Caller>,
    pub direction: Direction,
    pub payload: String,
    /// Matched text, for `Match` entries.
    pub matched: Option<String>,
}

/// Append-only per-session transcript.
pub struct Transcript {
    start: Instant,
    tag: String,
    color: AnsiColors,
    debug: DebugLevel,
    entries: Vec<TranscriptEntry>,
    suspended: bool,
}

/// Rotating palette for per-device colors.
const PALETTE: [AnsiColors; 6] = [
    AnsiColors::Cyan,
    AnsiColors::Yellow,
    AnsiColors::Green,
    AnsiColors::Magenta,
    AnsiColors::Blue,
    AnsiColors::Red,
];

/// Pick a stable palette color for a device tag.
pub fn color_for(tag: &str) -> AnsiColors {
    let sum: usize = tag.bytes().map(usize::from).sum();
    PALETTE[sum % PALETTE.len()]
}

impl Transcript {
    pub fn new(tag: impl Into<String>, debug: DebugLevel, start: Option<Instant>) -> Self {
        let tag = tag.into();
        Self {
            start: start.unwrap_or_else(Instant::now),
            color: color_for(&tag),
            tag,
            debug,
            entries: Vec::new(),
            suspended: false,
        }
    }

    /// Record an entry, honoring suspension and the debug mirror.
    pub fn record(
        &mut self,
        direction: Direction,
        caller: Option<Caller>,
        payload: &str,
        matched: Option<&str>,
    ) {
        if self.suspended {
            return;
        }

        let at = self.start.elapsed();
        self.mirror(direction, caller, payload, at);
        self.entries.push(TranscriptEntry {
            at,
            caller,
            direction,
            payload: payload.to_string(),
            matched: matched.map(str::to_string),
        });
    }

    fn mirror(&self, direction: Direction, caller: Option<Caller>, payload: &str, at: Duration) {
        match direction {
            Direction::Send | Direction::Expect | Direction::Match => {
                if self.debug >= DebugLevel::On {
                    let at = at.as_secs_f64();
                    let caller = caller.map(|c| c.to_string()).unwrap_or_default();
                    println!(
                        "{}",
                        format!("[{:.3}s {} {}] {:?} {}", at, self.tag, caller, direction, payload.trim_end())
                            .bold()
                    );
                }
            }
            Direction::Recv => {
                if self.debug >= DebugLevel::Verbose {
                    print!("{}", payload.color(self.color));
                }
            }
            Direction::Note => {}
        }
    }

    /// Stop recording (used by `interact`). Idempotent.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Resume recording.
    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Render the transcript as text, one entry per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let caller = entry
                .caller
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "{:>10.3} {:<7} {} {:?}\n",
                entry.at.as_secs_f64(),
                format!("{:?}", entry.direction),
                caller,
                entry.payload,
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_entries_in_order() {
        let mut t = Transcript::new("board", DebugLevel::Off, None);
        t.record(Direction::Send, Some(Caller::here()), "ls\n", None);
        t.record(Direction::Recv, None, "file\n", None);

        assert_eq!(t.entries().len(), 2);
        assert_eq!(t.entries()[0].direction, Direction::Send);
        assert!(t.entries()[0].caller.unwrap().file.ends_with("transcript.rs"));
        assert!(t.entries()[1].at >= t.entries()[0].at);
    }

    #[test]
    fn test_suspend_drops_entries() {
        let mut t = Transcript::new("board", DebugLevel::Off, None);
        t.suspend();
        t.record(Direction::Send, None, "hidden", None);
        assert!(t.entries().is_empty());

        t.resume();
        t.record(Direction::Send, None, "visible", None);
        assert_eq!(t.entries().len(), 1);
    }

    #[test]
    fn test_color_is_stable() {
        assert_eq!(color_for("lan"), color_for("lan"));
    }

    #[test]
    fn test_render_contains_payload() {
        let mut t = Transcript::new("board", DebugLevel::Off, None);
        t.record(Direction::Send, None, "echo FOO\n", None);
        assert!(t.render().contains("echo FOO"));
    }
}
