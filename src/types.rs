use std::{borrow::Cow, fmt, str::FromStr};

use serde_json::Value;

/// Event types accepted by `swaymsg -t subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwayEventType {
    Workspace,
    Window,
    Output,
    Mode,
    BarconfigUpdate,
    Binding,
    Shutdown,
    Tick,
    BarStateUpdate,
    Input,
}

impl SwayEventType {
    pub const ALL: [SwayEventType; 10] = [
        SwayEventType::Workspace,
        SwayEventType::Window,
        SwayEventType::Output,
        SwayEventType::Mode,
        SwayEventType::BarconfigUpdate,
        SwayEventType::Binding,
        SwayEventType::Shutdown,
        SwayEventType::Tick,
        SwayEventType::BarStateUpdate,
        SwayEventType::Input,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SwayEventType::Workspace => "workspace",
            SwayEventType::Window => "window",
            SwayEventType::Output => "output",
            SwayEventType::Mode => "mode",
            SwayEventType::BarconfigUpdate => "barconfig_update",
            SwayEventType::Binding => "binding",
            SwayEventType::Shutdown => "shutdown",
            SwayEventType::Tick => "tick",
            SwayEventType::BarStateUpdate => "bar_state_update",
            SwayEventType::Input => "input",
        }
    }
}

impl fmt::Display for SwayEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwayEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePhase {
    Idled,
    Resumed,
}

impl fmt::Display for IdlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdlePhase::Idled => f.write_str("idled"),
            IdlePhase::Resumed => f.write_str("resumed"),
        }
    }
}

/// A normalized event, tagged by the source it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Hyprland {
        name: String,
        data: String,
    },
    Sway {
        event_type: SwayEventType,
        payload: Value,
    },
    Logind {
        sender: String,
        signal: String,
        payload: String,
    },
    Idle {
        index: usize,
        phase: IdlePhase,
    },
}

/// One resolved handler invocation: the handler name and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerCall {
    pub name: Cow<'static, str>,
    pub args: Vec<Value>,
}

impl HandlerCall {
    fn new(name: impl Into<Cow<'static, str>>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

impl Event {
    /// Handler invocations this event produces, in call order.
    ///
    /// Idle transitions run their configured command lists instead and map to
    /// no named handler.
    pub fn handler_calls(&self) -> Vec<HandlerCall> {
        match self {
            Event::Hyprland { name, data } => vec![HandlerCall::new(
                "on_hyprland_event",
                vec![Value::from(name.as_str()), Value::from(data.as_str())],
            )],
            Event::Sway {
                event_type,
                payload,
            } => vec![HandlerCall::new(
                format!("on_sway_event_{event_type}"),
                vec![payload.clone()],
            )],
            Event::Logind {
                sender,
                signal,
                payload,
            } => {
                let mut calls = Vec::with_capacity(2);
                if !signal.contains("Properties") {
                    calls.push(HandlerCall::new(
                        format!("on_{signal}"),
                        vec![Value::from(payload.as_str())],
                    ));
                }
                calls.push(HandlerCall::new(
                    "on_systemd_event",
                    vec![
                        Value::from(sender.as_str()),
                        Value::from(signal.as_str()),
                        Value::from(payload.as_str()),
                    ],
                ));
                calls
            }
            Event::Idle { .. } => Vec::new(),
        }
    }
}
