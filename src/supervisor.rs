use std::{sync::Arc, time::SystemTime};

use futures::stream::{FuturesUnordered, StreamExt};
use log::{error, info, warn};
use tokio::{runtime::Handle, task::JoinHandle};

use crate::{
    config::{ListenerPlan, Source},
    handlers::HandlerRegistry,
    idle::IdleThresholds,
    listeners::{
        run_process_listener, EventClock, ExitReason, FailurePolicy, HyprlandListener,
        LineListener, ListenerExit, LogindListener, SwayListener,
    },
    stream::ChildTracker,
    wayland,
};

/// Owns the listener workers. Workers are never restarted: once one exits its
/// source stays silent for the rest of the run.
pub struct Supervisor {
    registry: Arc<HandlerRegistry>,
    workers: FuturesUnordered<JoinHandle<ListenerExit>>,
    clock: EventClock,
    children: ChildTracker,
}

impl Supervisor {
    fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            workers: FuturesUnordered::new(),
            clock: EventClock::default(),
            children: ChildTracker::default(),
        }
    }

    /// Runs the `init` handler, then starts one worker per planned source.
    /// Must be called from within the tokio runtime.
    pub fn start(plan: ListenerPlan, registry: Arc<HandlerRegistry>) -> Self {
        info!("Starting easyland daemon");
        let mut supervisor = Self::new(registry);
        supervisor.registry.call("init", &[]);

        for source in plan.sources {
            match source {
                Source::Hyprland { socket_path } => {
                    info!("Launching hyprland daemon");
                    let listener = HyprlandListener::new(socket_path, supervisor.clock.clone());
                    supervisor.spawn_process(listener);
                }
                Source::Sway(event_type) => {
                    info!("Launching Sway daemon for event type: {}", event_type);
                    supervisor.spawn_process(SwayListener::new(event_type));
                }
                Source::Logind => {
                    info!("Launching systemd daemon");
                    supervisor.spawn_process(LogindListener::new());
                }
                Source::Idle(specs) => {
                    info!("Launching idle daemon with {} threshold(s)", specs.len());
                    supervisor.spawn_idle(IdleThresholds::new(specs));
                }
            }
        }

        if supervisor.workers.is_empty() {
            warn!("No daemon tasks to run.");
        }
        supervisor
    }

    fn spawn_worker<F>(&mut self, work: F)
    where
        F: FnOnce() -> ListenerExit + Send + 'static,
    {
        self.workers.push(tokio::task::spawn_blocking(work));
    }

    fn spawn_process<L: LineListener>(&mut self, listener: L) {
        let registry = self.registry.clone();
        let children = self.children.clone();
        self.spawn_worker(move || run_process_listener(&listener, &registry, &children));
    }

    /// Runs `listener` over an already open stream.
    #[cfg(test)]
    fn spawn_stream<L, R>(&mut self, listener: L, stream: crate::stream::LineStream<R>)
    where
        L: LineListener,
        R: std::io::BufRead + Send + 'static,
    {
        let registry = self.registry.clone();
        self.spawn_worker(move || crate::listeners::run_line_listener(&listener, stream, &registry));
    }

    fn spawn_idle(&mut self, thresholds: IdleThresholds) {
        let runtime = Handle::current();
        self.spawn_worker(move || {
            let reason = match wayland::run(thresholds, runtime) {
                Ok(()) => ExitReason::EndOfStream {
                    stderr: String::new(),
                },
                Err(e) => ExitReason::Failed(e),
            };
            ListenerExit::new("Idle", FailurePolicy::WorkerFatal, reason)
        });
    }

    #[cfg(test)]
    fn clock(&self) -> &EventClock {
        &self.clock
    }

    /// Time of the last parsed Hyprland event.
    pub fn last_event(&self) -> Option<SystemTime> {
        self.clock.last()
    }

    /// Kills the processes of listeners still running and returns how many
    /// were killed. Their workers see end of stream.
    pub fn shutdown(&self) -> usize {
        let killed = self.children.kill_all();
        if killed > 0 {
            info!("Stopped {} listener process(es)", killed);
        }
        killed
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Waits for workers to exit. Returns `Ok` once every worker is gone, or
    /// the first process-fatal exit as an error.
    pub async fn wait(&mut self) -> Result<(), ListenerExit> {
        while let Some(joined) = self.workers.next().await {
            match joined {
                Ok(exit) if exit.policy == FailurePolicy::ProcessFatal => return Err(exit),
                Ok(exit) => exit.log(),
                Err(e) => error!("Listener worker panicked: {}", e),
            }
        }
        Ok(())
    }
}
