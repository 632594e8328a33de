use anyhow::Context;
use log::{debug, info};
use tokio::runtime::Handle;
use wayland_client::{
    protocol::{wl_registry, wl_seat},
    Connection, Dispatch, QueueHandle,
};
use wayland_protocols::ext::idle_notify::v1::client::{ext_idle_notification_v1, ext_idle_notifier_v1};

use crate::{
    command,
    idle::{Bindings, IdleThresholds},
    types::{Event, IdlePhase},
};

/// User data attached to each idle notification: its threshold index.
#[derive(Clone, Copy, Debug)]
pub struct NotificationContext {
    pub index: usize,
}

pub struct State {
    bindings: Bindings<wl_seat::WlSeat, ext_idle_notifier_v1::ExtIdleNotifierV1>,
    thresholds: IdleThresholds,
    notifications: Vec<ext_idle_notification_v1::ExtIdleNotificationV1>,
    runtime: Handle,
}

impl State {
    pub fn new(thresholds: IdleThresholds, runtime: Handle) -> Self {
        Self {
            bindings: Bindings::default(),
            thresholds,
            notifications: Vec::new(),
            runtime,
        }
    }

    fn register_notifications(
        &mut self,
        seat: &wl_seat::WlSeat,
        notifier: &ext_idle_notifier_v1::ExtIdleNotifierV1,
        qh: &QueueHandle<Self>,
    ) {
        for (index, spec) in self.thresholds.iter() {
            let Some(timeout) = spec.timeout_millis() else {
                continue;
            };
            info!("Setting idle notifier for {} seconds", spec.timeout);
            let notification =
                notifier.get_idle_notification(timeout, seat, qh, NotificationContext { index });
            self.notifications.push(notification);
        }
    }
}

/// Connects to the compositor and dispatches idle events until the connection
/// fails. Blocks the calling thread.
pub fn run(thresholds: IdleThresholds, runtime: Handle) -> anyhow::Result<()> {
    let connection = Connection::connect_to_env().context("Failed to connect to Wayland display")?;
    let mut event_queue = connection.new_event_queue();
    let qh = event_queue.handle();

    let display = connection.display();
    display.get_registry(&qh, ());

    let mut state = State::new(thresholds, runtime);
    loop {
        event_queue
            .blocking_dispatch(&mut state)
            .context("Wayland dispatch failed")?;
    }
}

impl Dispatch<wl_registry::WlRegistry, ()> for State {
    fn event(
        state: &mut Self,
        registry: &wl_registry::WlRegistry,
        event: wl_registry::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if state.bindings.is_bound() {
            return;
        }
        if let wl_registry::Event::Global {
            name, interface, ..
        } = event
        {
            let ready = match &interface[..] {
                "wl_seat" => {
                    debug!("wl_seat: {:?}", name);
                    let seat = registry.bind::<wl_seat::WlSeat, _, _>(name, 1, qh, ());
                    state.bindings.offer_seat(seat)
                }
                "ext_idle_notifier_v1" => {
                    debug!("ext_idle_notifier_v1: {:?}", name);
                    let notifier = registry
                        .bind::<ext_idle_notifier_v1::ExtIdleNotifierV1, _, _>(name, 1, qh, ());
                    state.bindings.offer_notifier(notifier)
                }
                _ => None,
            };
            if let Some((seat, notifier)) = ready {
                state.register_notifications(&seat, &notifier, qh);
            }
        }
    }
}

impl Dispatch<wl_seat::WlSeat, ()> for State {
    fn event(_: &mut Self, _: &wl_seat::WlSeat, _: wl_seat::Event, _: &(), _: &Connection, _qh: &QueueHandle<Self>) {}
}
impl Dispatch<ext_idle_notifier_v1::ExtIdleNotifierV1, ()> for State {
    fn event(_: &mut Self, _: &ext_idle_notifier_v1::ExtIdleNotifierV1, _: ext_idle_notifier_v1::Event, _: &(), _: &Connection, _qh: &QueueHandle<Self>) {}
}

impl Dispatch<ext_idle_notification_v1::ExtIdleNotificationV1, NotificationContext> for State {
    fn event(
        state: &mut Self,
        _idle_notification: &ext_idle_notification_v1::ExtIdleNotificationV1,
        event: ext_idle_notification_v1::Event,
        ctx: &NotificationContext,
        _: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        debug!("Idle Notification event: {:?} index: {}", event, ctx.index);

        let phase = match event {
            ext_idle_notification_v1::Event::Idled => IdlePhase::Idled,
            ext_idle_notification_v1::Event::Resumed => IdlePhase::Resumed,
            _ => return,
        };
        let event = Event::Idle {
            index: ctx.index,
            phase,
        };
        let runtime = &state.runtime;
        state
            .thresholds
            .handle(&event, |cmd| command::spawn_detached(runtime, cmd));
    }
}
