//! Sway IPC subscription through `swaymsg -m`, one process per event type.

use serde_json::Value;

use super::{FailurePolicy, LineListener, ListenerPolicy, Parsed};
use crate::{
    stream::CommandLine,
    types::{Event, SwayEventType},
};

pub struct SwayListener {
    event_type: SwayEventType,
}

impl SwayListener {
    pub fn new(event_type: SwayEventType) -> Self {
        Self { event_type }
    }
}

impl LineListener for SwayListener {
    const POLICY: ListenerPolicy = ListenerPolicy {
        end_of_stream: FailurePolicy::WorkerFatal,
        parse_error: FailurePolicy::WorkerFatal,
        unmatched: FailurePolicy::WorkerFatal,
        capture_stderr: false,
    };

    fn label(&self) -> String {
        format!("Sway[{}]", self.event_type)
    }

    fn command(&self) -> CommandLine {
        CommandLine::new(
            "swaymsg",
            [
                "-m".to_string(),
                "-r".to_string(),
                "-t".to_string(),
                "subscribe".to_string(),
                format!("[\"{}\"]", self.event_type),
            ],
        )
    }

    fn parse(&self, line: &str) -> Parsed {
        match serde_json::from_str::<Value>(line.trim()) {
            Ok(payload) => Parsed::Event(Event::Sway {
                event_type: self.event_type,
                payload,
            }),
            Err(e) => Parsed::Malformed(e.to_string()),
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
    fn subscribes_to_exactly_one_event_type() {
        let command = SwayListener::new(SwayEventType::BarconfigUpdate).command();
        assert_eq!(command.to_string(), r#"swaymsg -m -r -t subscribe ["barconfig_update"]"#);
    }

    #[test]
    fn valid_json_is_dispatched_to_typed_handler() {
        let (registry, calls) = recording_registry(&["on_sway_event_workspace", "on_sway_event_window"]);
        let stream = LineStream::from_reader(Cursor::new(
            "{\"change\":\"focus\",\"current\":{\"num\":3}}\n[1,2]\n",
        ));

        let exit = run_line_listener(&SwayListener::new(SwayEventType::Workspace), stream, &registry);

        assert_eq!(exit.policy, FailurePolicy::WorkerFatal);
        assert!(matches!(exit.reason, ExitReason::EndOfStream { .. }));
        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "on_sway_event_workspace");
        assert_eq!(calls[0].1, vec![json!({"change": "focus", "current": {"num": 3}})]);
        assert_eq!(calls[1].1, vec![json!([1, 2])]);
    }

    #[test]
    fn malformed_json_ends_the_worker_without_dispatch() {
        for _ in 0..2 {
            let (registry, calls) = recording_registry(&["on_sway_event_window"]);
            let stream = LineStream::from_reader(Cursor::new("{\"change\": \n{\"change\":\"new\"}\n"));

            let exit = run_line_listener(&SwayListener::new(SwayEventType::Window), stream, &registry);

            assert_eq!(exit.policy, FailurePolicy::WorkerFatal);
            assert!(
                matches!(exit.reason, ExitReason::Malformed { ref line, .. } if line == "{\"change\": ")
            );
            assert!(calls.lock().is_empty());
        }
    }

    #[test]
    fn empty_line_is_malformed() {
        let listener = SwayListener::new(SwayEventType::Tick);
        assert!(matches!(listener.parse("  "), Parsed::Malformed(_)));
    }
}
