//! systemd-logind signals, scraped from `gdbus monitor` output.
//!
//! Lines look like
//! `/org/freedesktop/login1: org.freedesktop.login1.Manager.PrepareForSleep (true,)`.

use regex::Regex;

use super::{FailurePolicy, LineListener, ListenerPolicy, Parsed};
use crate::{stream::CommandLine, types::Event};

pub const DESTINATION: &str = "org.freedesktop.login1";

pub struct LogindListener {
    pattern: Regex,
}

impl LogindListener {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"^(.+?): (\S+?) \((.*?)\)$").expect("static regex"),
        }
    }

    pub fn parse_line(&self, line: &str) -> Option<Event> {
        let caps = self.pattern.captures(line.trim())?;
        let name = &caps[2];
        let signal = name.rsplit('.').next().unwrap_or(name);
        Some(Event::Logind {
            sender: caps[1].to_string(),
            signal: signal.to_string(),
            payload: caps[3].to_string(),
        })
    }
}

impl Default for LogindListener {
    fn default() -> Self {
        Self::new()
    }
}

impl LineListener for LogindListener {
    const POLICY: ListenerPolicy = ListenerPolicy {
        end_of_stream: FailurePolicy::WorkerFatal,
        parse_error: FailurePolicy::Ignore,
        unmatched: FailurePolicy::Ignore,
        capture_stderr: false,
    };

    fn label(&self) -> String {
        "systemd-logind".into()
    }

    fn command(&self) -> CommandLine {
        CommandLine::new("gdbus", ["monitor", "--system", "--dest", DESTINATION])
    }

    fn parse(&self, line: &str) -> Parsed {
        match self.parse_line(line) {
            Some(event) => Parsed::Event(event),
            None => Parsed::Unmatched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        handlers::tests::recording_registry,
        listeners::{run_line_listener, ExitReason},
        stream::LineStream,
    };
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn extracts_sender_signal_and_payload() {
        let listener = LogindListener::new();
        assert_eq!(
            listener.parse_line(
                "org.freedesktop.login1.Manager: org.freedesktop.login1.Manager.PrepareForSleep (true)"
            ),
            Some(Event::Logind {
                sender: "org.freedesktop.login1.Manager".into(),
                signal: "PrepareForSleep".into(),
                payload: "true".into(),
            })
        );
    }

    #[test]
    fn payload_runs_to_the_last_parenthesis() {
        let listener = LogindListener::new();
        let event = listener
            .parse_line("/org/freedesktop/login1/session/_32: org.freedesktop.login1.Session.Lock ()")
            .unwrap();
        assert_eq!(
            event,
            Event::Logind {
                sender: "/org/freedesktop/login1/session/_32".into(),
                signal: "Lock".into(),
                payload: String::new(),
            }
        );

        let event = listener
            .parse_line("/org/freedesktop/login1: org.freedesktop.login1.Manager.SessionNew ('3', objectpath '/org/freedesktop/login1/session/_33')")
            .unwrap();
        assert!(
            matches!(event, Event::Logind { ref payload, .. } if payload == "'3', objectpath '/org/freedesktop/login1/session/_33'")
        );
    }

    #[test]
    fn header_lines_are_unmatched() {
        let listener = LogindListener::new();
        assert_eq!(listener.parse("Monitoring signals from all objects owned by org.freedesktop.login1"), Parsed::Unmatched);
        assert_eq!(listener.parse("The name org.freedesktop.login1 is owned by :1.4"), Parsed::Unmatched);
    }

    #[test]
    fn command_monitors_login1_on_system_bus() {
        assert_eq!(
            LogindListener::new().command().to_string(),
            "gdbus monitor --system --dest org.freedesktop.login1"
        );
    }

    #[test]
    fn properties_changed_only_reaches_catch_all() {
        let (registry, calls) =
            recording_registry(&["on_PropertiesChanged", "on_PrepareForSleep", "on_systemd_event"]);
        let stream = LineStream::from_reader(Cursor::new(concat!(
            "Monitoring signals from all objects owned by org.freedesktop.login1\n",
            "/org/freedesktop/login1/session/_32: org.freedesktop.DBus.Properties.PropertiesChanged ('org.freedesktop.login1.Session', {'IdleHint': <true>}, @as [])\n",
            "org.freedesktop.login1.Manager: org.freedesktop.login1.Manager.PrepareForSleep (true)\n",
        )));

        let exit = run_line_listener(&LogindListener::new(), stream, &registry);

        assert_eq!(exit.policy, FailurePolicy::WorkerFatal);
        assert!(matches!(exit.reason, ExitReason::EndOfStream { .. }));
        let calls = calls.lock();
        let names: Vec<_> = calls.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["on_systemd_event", "on_PrepareForSleep", "on_systemd_event"]);
        assert_eq!(calls[0].1[1], json!("PropertiesChanged"));
        assert_eq!(calls[1].1, vec![json!("true")]);
        assert_eq!(
            calls[2].1,
            vec![json!("org.freedesktop.login1.Manager"), json!("PrepareForSleep"), json!("true")]
        );
    }
}
