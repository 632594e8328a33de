//! Hyprland socket2 event stream, read through `socat`.
//!
//! Events arrive as `EVENT_NAME>>DATA`, one per line. The data part may itself
//! contain `>>`; only the first occurrence splits.

use std::path::PathBuf;

use super::{EventClock, FailurePolicy, LineListener, ListenerPolicy, Parsed};
use crate::{stream::CommandLine, types::Event};

pub const DEFAULT_SOCKET_PATH: &str =
    "$XDG_RUNTIME_DIR/hypr/$HYPRLAND_INSTANCE_SIGNATURE/.socket2.sock";

pub struct HyprlandListener {
    socket_path: PathBuf,
    clock: EventClock,
}

impl HyprlandListener {
    pub fn new(socket_path: PathBuf, clock: EventClock) -> Self {
        Self { socket_path, clock }
    }
}

pub fn parse_line(line: &str) -> Option<Event> {
    let (name, data) = line.trim().split_once(">>")?;
    Some(Event::Hyprland {
        name: name.to_string(),
        data: data.to_string(),
    })
}

impl LineListener for HyprlandListener {
    // Losing the compositor socket means the session is gone.
    const POLICY: ListenerPolicy = ListenerPolicy {
        end_of_stream: FailurePolicy::ProcessFatal,
        parse_error: FailurePolicy::Ignore,
        unmatched: FailurePolicy::Ignore,
        capture_stderr: true,
    };

    fn label(&self) -> String {
        "Hyprland".into()
    }

    fn command(&self) -> CommandLine {
        CommandLine::new(
            "socat",
            [
                "-U".to_string(),
                "-".to_string(),
                format!("UNIX-CONNECT:{}", self.socket_path.display()),
            ],
        )
    }

    fn parse(&self, line: &str) -> Parsed {
        match parse_line(line) {
            Some(event) => Parsed::Event(event),
            None => Parsed::Unmatched,
        }
    }

    fn observed(&self, _event: &Event) {
        self.clock.touch();
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

    fn listener() -> HyprlandListener {
        HyprlandListener::new(PathBuf::from("/run/user/1000/hypr/abc/.socket2.sock"), EventClock::default())
    }

    #[test]
    fn splits_on_first_delimiter() {
        assert_eq!(
            parse_line("activewindow>>kitty,~ >> vim\n"),
            Some(Event::Hyprland {
                name: "activewindow".into(),
                data: "kitty,~ >> vim".into(),
            })
        );
        assert_eq!(
            parse_line("configreloaded>>"),
            Some(Event::Hyprland {
                name: "configreloaded".into(),
                data: String::new(),
            })
        );
    }

    #[test]
    fn lines_without_delimiter_are_unmatched() {
        assert_eq!(parse_line("workspace 2"), None);
        assert_eq!(listener().parse("garbage"), Parsed::Unmatched);
        assert_eq!(listener().parse(""), Parsed::Unmatched);
    }

    #[test]
    fn command_connects_to_socket_through_socat() {
        let command = listener().command();
        assert_eq!(command.program, "socat");
        assert_eq!(
            command.args,
            vec!["-U", "-", "UNIX-CONNECT:/run/user/1000/hypr/abc/.socket2.sock"]
        );
    }

    #[test]
    fn dispatches_each_event_once_and_dies_with_the_stream() {
        let (registry, calls) = recording_registry(&["on_hyprland_event"]);
        let listener = listener();
        let stream = LineStream::from_reader(Cursor::new(
            "workspace>>2\nnot an event\nopenwindow>>80e62df0,2,kitty,Kitty\n",
        ));

        let exit = run_line_listener(&listener, stream, &registry);

        assert_eq!(exit.policy, FailurePolicy::ProcessFatal);
        assert!(matches!(exit.reason, ExitReason::EndOfStream { .. }));
        let calls = calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, vec![json!("workspace"), json!("2")]);
        assert_eq!(calls[1].1, vec![json!("openwindow"), json!("80e62df0,2,kitty,Kitty")]);
        assert!(listener.clock.last().is_some());
    }

    #[test]
    fn unmatched_lines_leave_clock_untouched() {
        let (registry, calls) = recording_registry(&["on_hyprland_event"]);
        let listener = listener();
        let stream = LineStream::from_reader(Cursor::new("no delimiter here\n"));

        run_line_listener(&listener, stream, &registry);

        assert!(calls.lock().is_empty());
        assert_eq!(listener.clock.last(), None);
    }
}
