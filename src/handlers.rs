use std::{
    collections::HashMap,
    process::{Command, Stdio},
    sync::Arc,
};

use log::{debug, error, warn};
use serde_json::Value;

use crate::types::Event;

pub type Handler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Maps handler names to callables. Built once, then shared read-only by every
/// listener worker.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry where every entry runs a shell command.
    pub fn from_commands(commands: &HashMap<String, String>) -> Self {
        let mut registry = Self::new();
        for (name, command) in commands {
            debug!("Registering handler {} -> '{}'", name, command);
            registry.register(name.clone(), shell_handler(command.clone()));
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Handler) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Invokes `name` if registered. Returns whether a handler ran.
    pub fn call(&self, name: &str, args: &[Value]) -> bool {
        match self.handlers.get(name) {
            Some(handler) => {
                handler(args);
                true
            }
            None => false,
        }
    }

    pub fn dispatch(&self, event: &Event) {
        for call in event.handler_calls() {
            self.call(&call.name, &call.args);
        }
    }
}

fn shell_arg(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A handler running `sh -c <command> easyland <args...>`, so arguments are
/// available to the command as `$1..$n`. Waits for the command to finish.
pub fn shell_handler(command: String) -> Handler {
    Arc::new(move |args: &[Value]| {
        debug!("Executing handler command: {}", command);
        let status = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .arg("easyland")
            .args(args.iter().map(shell_arg))
            .stdin(Stdio::null())
            .status();
        match status {
            Ok(status) if status.success() => {}
            Ok(status) => warn!("Handler command '{}' exited with {}", command, status),
            Err(e) => error!("Failed to spawn handler command '{}': {}", command, e),
        }
    })
}
