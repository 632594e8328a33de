use std::process::{Command, Stdio};

use anyhow::{bail, Context};
use log::{debug, error, info};
use serde_json::Value;
use tokio::runtime::Handle;

/// Launches `cmd` through `sh -c` with stdio discarded, without waiting for it.
/// The child is reaped on `runtime`.
pub fn spawn_detached(runtime: &Handle, cmd: &str) {
    let cmd = cmd.to_string();
    info!("Executing background command: {}", cmd);

    runtime.spawn(async move {
        match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(mut child) => match child.wait().await {
                Ok(status) => debug!("Command '{}' finished with {}", cmd, status),
                Err(e) => error!("Command '{}' failed to wait: {}", cmd, e),
            },
            Err(e) => error!("Failed to spawn '{}': {}", cmd, e),
        }
    });
}

/// Runs a query command once and decodes its stdout as JSON.
///
/// A failing command is an error; output that is not JSON yields `None`.
pub fn exec_json(program: &str, args: &[&str]) -> anyhow::Result<Option<Value>> {
    info!("Executing command: {} {}", program, args.join(" "));
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to run {program}"))?;
    if !output.status.success() {
        bail!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(serde_json::from_slice(&output.stdout).ok())
}

fn monitor_list(value: Option<Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(monitors)) => monitors,
        _ => Vec::new(),
    }
}

pub fn sway_get_all_monitors() -> anyhow::Result<Vec<Value>> {
    exec_json("swaymsg", &["-t", "get_outputs"]).map(monitor_list)
}

pub fn hyprland_get_all_monitors() -> anyhow::Result<Vec<Value>> {
    exec_json("hyprctl", &["-j", "monitors"]).map(monitor_list)
}

/// Substring filters over monitor descriptors. The first monitor matching any
/// set field wins.
#[derive(Debug, Clone, Default)]
pub struct MonitorFilter {
    pub name: Option<String>,
    pub description: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
}

impl MonitorFilter {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.make.is_none() && self.model.is_none()
    }

    pub fn matches(&self, monitor: &Value) -> bool {
        let field_contains = |key: &str, needle: &Option<String>| match needle {
            Some(needle) => monitor
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or("")
                .contains(needle.as_str()),
            None => false,
        };
        field_contains("name", &self.name)
            || field_contains("description", &self.description)
            || field_contains("make", &self.make)
            || field_contains("model", &self.model)
    }
}

pub fn find_monitor<'a>(monitors: &'a [Value], filter: &MonitorFilter) -> Option<&'a Value> {
    monitors.iter().find(|monitor| filter.matches(monitor))
}

pub fn hostname() -> Option<String> {
    sysinfo::System::host_name()
}
