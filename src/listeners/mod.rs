//! Line-oriented event sources and the loop that drives them.
//!
//! Every listener owns one child process. The loop reads its stdout a line at a
//! time, lets the listener parse the line, and hands parsed events to the
//! handler registry. What happens on end of stream, on undecodable input and on
//! lines that simply don't match is decided by each listener's
//! [`ListenerPolicy`], not by the loop.

use std::{io, sync::Arc, time::SystemTime};

use log::{debug, error, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    handlers::HandlerRegistry,
    stream::{ChildTracker, CommandLine, LineStream},
    types::Event,
};

pub mod hyprland;
pub mod logind;
pub mod sway;

pub use hyprland::HyprlandListener;
pub use logind::LogindListener;
pub use sway::SwayListener;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The whole daemon exits with a non-zero status.
    ProcessFatal,
    /// Only this worker stops; other sources keep running.
    WorkerFatal,
    /// Skip the offending line and keep reading.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerPolicy {
    pub end_of_stream: FailurePolicy,
    pub parse_error: FailurePolicy,
    pub unmatched: FailurePolicy,
    /// Read the child's stderr into the exit reason on end of stream.
    pub capture_stderr: bool,
}

/// Result of parsing one line.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Event(Event),
    /// Not an event line; not an error either.
    Unmatched,
    /// The line should have been an event but could not be decoded.
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ExitReason {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("subprocess ended unexpectedly{}", stderr_suffix(.stderr))]
    EndOfStream { stderr: String },
    #[error("read error: {0}")]
    Read(#[from] io::Error),
    #[error("invalid input '{line}': {error}")]
    Malformed { line: String, error: String },
    #[error("unexpected line '{line}'")]
    Unmatched { line: String },
    #[error("{0:#}")]
    Failed(anyhow::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Why and how a worker stopped.
#[derive(Debug, Error)]
#[error("{listener} listener stopped: {reason}")]
pub struct ListenerExit {
    pub listener: String,
    pub policy: FailurePolicy,
    pub reason: ExitReason,
}

impl ListenerExit {
    pub fn new(listener: impl Into<String>, policy: FailurePolicy, reason: ExitReason) -> Self {
        Self {
            listener: listener.into(),
            policy,
            reason,
        }
    }

    /// Logs the exit at a level matching its policy.
    pub fn log(&self) {
        match self.policy {
            FailurePolicy::ProcessFatal | FailurePolicy::WorkerFatal => error!("{}", self),
            FailurePolicy::Ignore => warn!("{}", self),
        }
    }
}

/// Last time an event was seen on a source. Never moves backwards.
#[derive(Debug, Clone, Default)]
pub struct EventClock(Arc<Mutex<Option<SystemTime>>>);

impl EventClock {
    pub fn touch(&self) {
        self.touch_at(SystemTime::now());
    }

    pub fn touch_at(&self, at: SystemTime) {
        let mut last = self.0.lock();
        if last.map_or(true, |prev| at > prev) {
            *last = Some(at);
        }
    }

    pub fn last(&self) -> Option<SystemTime> {
        *self.0.lock()
    }
}

pub trait LineListener: Send + 'static {
    const POLICY: ListenerPolicy;

    /// Name used in log lines.
    fn label(&self) -> String;

    fn command(&self) -> CommandLine;

    fn parse(&self, line: &str) -> Parsed;

    /// Called for every parsed event before it is dispatched.
    fn observed(&self, _event: &Event) {}
}

/// Spawns the listener's process and runs it to completion.
pub fn run_process_listener<L: LineListener>(
    listener: &L,
    registry: &HandlerRegistry,
    children: &ChildTracker,
) -> ListenerExit {
    let command = listener.command();
    match LineStream::spawn(&command) {
        Ok(stream) => {
            children.track(&stream);
            run_line_listener(listener, stream, registry)
        }
        Err(source) => ListenerExit::new(
            listener.label(),
            L::POLICY.end_of_stream,
            ExitReason::Spawn {
                command: command.to_string(),
                source,
            },
        ),
    }
}

/// Reads `stream` until the listener's policy says stop.
pub fn run_line_listener<L, R>(
    listener: &L,
    mut stream: LineStream<R>,
    registry: &HandlerRegistry,
) -> ListenerExit
where
    L: LineListener,
    R: io::BufRead,
{
    let label = listener.label();
    let policy = L::POLICY;

    loop {
        let line = match stream.next_line() {
            Ok(Some(line)) => line,
            Ok(None) => {
                let stderr = if policy.capture_stderr {
                    stream.drain_stderr()
                } else {
                    String::new()
                };
                return ListenerExit::new(label, policy.end_of_stream, ExitReason::EndOfStream { stderr });
            }
            Err(e) => return ListenerExit::new(label, policy.end_of_stream, ExitReason::Read(e)),
        };
        debug!("{}: {}", label, line);

        let (verdict, reason) = match listener.parse(&line) {
            Parsed::Event(event) => {
                listener.observed(&event);
                registry.dispatch(&event);
                continue;
            }
            Parsed::Unmatched => (policy.unmatched, ExitReason::Unmatched { line }),
            Parsed::Malformed(error) => (policy.parse_error, ExitReason::Malformed { line, error }),
        };

        if verdict == FailurePolicy::Ignore {
            debug!("{}: skipped ({})", label, reason);
            continue;
        }
        return ListenerExit::new(label, verdict, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io::Cursor, time::Duration};

    #[test]
    fn clock_never_moves_backwards() {
        let clock = EventClock::default();
        assert_eq!(clock.last(), None);

        let now = SystemTime::now();
        clock.touch_at(now);
        clock.touch_at(now - Duration::from_secs(5));
        assert_eq!(clock.last(), Some(now));

        let later = now + Duration::from_secs(1);
        clock.clone().touch_at(later);
        assert_eq!(clock.last(), Some(later));
    }

    #[test]
    fn end_of_stream_reason_includes_stderr() {
        let reason = ExitReason::EndOfStream {
            stderr: "Connection refused".into(),
        };
        assert_eq!(reason.to_string(), "subprocess ended unexpectedly: Connection refused");
        let reason = ExitReason::EndOfStream { stderr: String::new() };
        assert_eq!(reason.to_string(), "subprocess ended unexpectedly");
    }

    struct Strict;

    impl LineListener for Strict {
        const POLICY: ListenerPolicy = ListenerPolicy {
            end_of_stream: FailurePolicy::WorkerFatal,
            parse_error: FailurePolicy::Ignore,
            unmatched: FailurePolicy::WorkerFatal,
            capture_stderr: false,
        };

        fn label(&self) -> String {
            "strict".into()
        }

        fn command(&self) -> CommandLine {
            CommandLine::new("true", Vec::<String>::new())
        }

        fn parse(&self, line: &str) -> Parsed {
            match line {
                "bad" => Parsed::Malformed("nope".into()),
                "stop" => Parsed::Unmatched,
                _ => Parsed::Event(Event::Hyprland {
                    name: line.into(),
                    data: String::new(),
                }),
            }
        }
    }

    #[test]
    fn policy_decides_which_lines_stop_the_loop() {
        let (registry, calls) = crate::handlers::tests::recording_registry(&["on_hyprland_event"]);
        let stream = LineStream::from_reader(Cursor::new("one\nbad\ntwo\nstop\nthree\n"));

        let exit = run_line_listener(&Strict, stream, &registry);

        assert_eq!(exit.policy, FailurePolicy::WorkerFatal);
        assert!(matches!(exit.reason, ExitReason::Unmatched { ref line } if line == "stop"));
        let names: Vec<_> = calls.lock().iter().map(|(_, args)| args[0].clone()).collect();
        assert_eq!(names, vec!["one", "two"]);
    }

    #[test]
    fn spawn_failure_uses_end_of_stream_policy() {
        struct Missing;
        impl LineListener for Missing {
            const POLICY: ListenerPolicy = ListenerPolicy {
                end_of_stream: FailurePolicy::ProcessFatal,
                parse_error: FailurePolicy::Ignore,
                unmatched: FailurePolicy::Ignore,
                capture_stderr: true,
            };
            fn label(&self) -> String {
                "missing".into()
            }
            fn command(&self) -> CommandLine {
                CommandLine::new("easyland-definitely-missing-binary", ["x"])
            }
            fn parse(&self, _line: &str) -> Parsed {
                Parsed::Unmatched
            }
        }

        let exit = run_process_listener(&Missing, &HandlerRegistry::new(), &ChildTracker::default());
        assert_eq!(exit.policy, FailurePolicy::ProcessFatal);
        assert!(matches!(exit.reason, ExitReason::Spawn { .. }));
    }
}
