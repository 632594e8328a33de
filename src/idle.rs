use log::info;
use serde::Deserialize;

use crate::types::{Event, IdlePhase};

/// One idle threshold and the commands bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawIdleThreshold")]
pub struct IdleThresholdSpec {
    pub timeout: u32,
    pub idle: Vec<String>,
    pub resume: Vec<String>,
}

impl IdleThresholdSpec {
    pub fn new(timeout: u32, idle: Vec<String>, resume: Vec<String>) -> Self {
        Self {
            timeout,
            idle,
            resume,
        }
    }

    /// Timeout as the protocol expects it, `None` on overflow.
    pub fn timeout_millis(&self) -> Option<u32> {
        self.timeout.checked_mul(1000)
    }
}

// Entries are written either as `[timeout, [idle...], [resume...]]` with the
// resume list optional, or as an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawIdleThreshold {
    WithResume(u32, Vec<String>, Vec<String>),
    IdleOnly(u32, Vec<String>),
    Object {
        timeout: u32,
        #[serde(default)]
        idle: Vec<String>,
        #[serde(default)]
        resume: Vec<String>,
    },
}

impl From<RawIdleThreshold> for IdleThresholdSpec {
    fn from(raw: RawIdleThreshold) -> Self {
        match raw {
            RawIdleThreshold::WithResume(timeout, idle, resume) => Self::new(timeout, idle, resume),
            RawIdleThreshold::IdleOnly(timeout, idle) => Self::new(timeout, idle, Vec::new()),
            RawIdleThreshold::Object {
                timeout,
                idle,
                resume,
            } => Self::new(timeout, idle, resume),
        }
    }
}

/// The configured thresholds, indexed in configuration order.
#[derive(Debug, Clone, Default)]
pub struct IdleThresholds {
    specs: Vec<IdleThresholdSpec>,
}

impl IdleThresholds {
    pub fn new(specs: Vec<IdleThresholdSpec>) -> Self {
        Self { specs }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &IdleThresholdSpec)> {
        self.specs.iter().enumerate()
    }

    pub fn commands(&self, index: usize, phase: IdlePhase) -> &[String] {
        match (self.specs.get(index), phase) {
            (Some(spec), IdlePhase::Idled) => &spec.idle,
            (Some(spec), IdlePhase::Resumed) => &spec.resume,
            (None, _) => &[],
        }
    }

    /// Runs the commands for an idle transition. Other events are ignored.
    pub fn handle(&self, event: &Event, launch: impl FnMut(&str)) {
        if let Event::Idle { index, phase } = *event {
            self.run(index, phase, launch);
        }
    }

    /// Hands every command for this transition to `launch`, in order.
    pub fn run(&self, index: usize, phase: IdlePhase, mut launch: impl FnMut(&str)) {
        for command in self.commands(index, phase) {
            match phase {
                IdlePhase::Idled => info!("Idle - Running command: {}", command),
                IdlePhase::Resumed => info!("Idle - Resuming: Running command: {}", command),
            }
            launch(command);
        }
    }
}

/// Setup progress of the idle session: waiting for a seat and an idle notifier,
/// then bound exactly once.
#[derive(Debug)]
pub enum Bindings<S, N> {
    AwaitingBindings { seat: Option<S>, notifier: Option<N> },
    Bound,
}

impl<S, N> Default for Bindings<S, N> {
    fn default() -> Self {
        Bindings::AwaitingBindings {
            seat: None,
            notifier: None,
        }
    }
}

impl<S, N> Bindings<S, N> {
    pub fn is_bound(&self) -> bool {
        matches!(self, Bindings::Bound)
    }

    pub fn offer_seat(&mut self, seat: S) -> Option<(S, N)> {
        if let Bindings::AwaitingBindings { seat: slot, .. } = self {
            *slot = Some(seat);
        }
        self.try_bind()
    }

    pub fn offer_notifier(&mut self, notifier: N) -> Option<(S, N)> {
        if let Bindings::AwaitingBindings { notifier: slot, .. } = self {
            *slot = Some(notifier);
        }
        self.try_bind()
    }

    /// Moves to `Bound` and yields both objects the first time both are known.
    fn try_bind(&mut self) -> Option<(S, N)> {
        match std::mem::replace(self, Bindings::Bound) {
            Bindings::AwaitingBindings {
                seat: Some(seat),
                notifier: Some(notifier),
            } => Some((seat, notifier)),
            Bindings::Bound => None,
            waiting => {
                *self = waiting;
                None
            }
        }
    }
}
