use std::sync::Arc;
use std::time::Duration;
use futures::channel::mpsc::{channel, Sender};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::device::types::Presence;
use crate::error::PowerError;
use crate::power::constants::INPUT_BUFFER;
use crate::power::executor::{set_display_with_deadline, DisplayPower};
use crate::power::machine::{PowerEffect, PowerState, PowerStateMachine};

/// Everything the controller reacts to. Timer expiries and action outcomes are posted back into
/// the same queue as presence readings, so all transitions happen one after another.
#[derive(Debug)]
pub enum PowerInput {
    Presence(Presence),
    TimerFired { generation: u64 },
    ActionComplete { on: bool, result: Result<(), PowerError> },
}

fn start_timer(
    cancel: CancellationToken,
    mut sender: Sender<PowerInput>,
    generation: u64,
    after: Duration,
) {
    spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {},
            _ = sleep(after) => {
                // the controller may be gone already, which is fine
                let _ = sender.send(PowerInput::TimerFired { generation }).await;
            },
        }
    });
}

fn start_action<P: DisplayPower>(
    power: Arc<P>,
    mut sender: Sender<PowerInput>,
    on: bool,
) -> JoinHandle<()> {
    spawn(async move {
        let result = set_display_with_deadline(power.as_ref(), on).await;
        let _ = sender.send(PowerInput::ActionComplete { on, result }).await;
    })
}

/// Starts the display power controller task.
///
/// Returns the sender used to feed presence readings, a receiver that always holds the current
/// power state, and the handle of the task. After `cancel` is cancelled the task cancels its
/// timer and waits for in flight display actions before it finishes, so nothing touches the
/// display once the handle has been joined.
pub fn power_controller<P: DisplayPower>(
    cancel: CancellationToken,
    power: P,
    debounce: Duration,
) -> (Sender<PowerInput>, watch::Receiver<PowerState>, JoinHandle<()>) {
    let (input_sender, mut input_receiver) = channel::<PowerInput>(INPUT_BUFFER);
    let (state_sender, state_receiver) = watch::channel(PowerState::On);
    let completion_sender = input_sender.clone();
    let power = Arc::new(power);

    let handle = spawn(async move {
        let mut machine = PowerStateMachine::new(debounce);
        let mut timer_cancel: Option<CancellationToken> = None;
        let mut actions: Vec<JoinHandle<()>> = Vec::new();

        'mainloop: loop {
            let input = tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                Some(input) = input_receiver.next() => input,
            };

            let effects = match input {
                PowerInput::Presence(presence) => {
                    debug!(
                        "Presence {} in state {:?}, pending timer: {:?}",
                        presence, machine.state(), machine.pending_timer(),
                    );
                    machine.on_presence(&presence)
                },
                PowerInput::TimerFired { generation } => {
                    if machine.pending_timer() == Some(generation) {
                        info!("No presence for {}, turning display off", humantime::format_duration(debounce));
                    } else {
                        debug!("Ignoring superseded timer {}", generation);
                    }
                    machine.on_timer_fired(generation)
                },
                PowerInput::ActionComplete { on, result } => {
                    if let Err(err) = &result {
                        warn!("Failed to turn display {}: {}", if on { "on" } else { "off" }, err);
                    }
                    machine.on_action_complete(on, result.is_ok())
                },
            };

            for effect in effects {
                match effect {
                    PowerEffect::CancelTimer { generation } => {
                        debug!("Removing power saving timer {}", generation);
                        if let Some(token) = timer_cancel.take() {
                            token.cancel();
                        }
                    },
                    PowerEffect::StartTimer { generation, after } => {
                        info!("Turning display off in {} unless someone shows up", humantime::format_duration(after));
                        let token = cancel.child_token();
                        timer_cancel = Some(token.clone());
                        start_timer(token, completion_sender.clone(), generation, after);
                    },
                    PowerEffect::SetDisplay(on) => {
                        info!("Turning display {}", if on { "on" } else { "off" });
                        actions.retain(|action| !action.is_finished());
                        actions.push(start_action(power.clone(), completion_sender.clone(), on));
                    },
                }
            }

            let state = machine.state();
            state_sender.send_if_modified(|current| {
                let changed = *current != state;
                *current = state;
                changed
            });
        }

        if let Some(token) = timer_cancel.take() {
            token.cancel();
        }

        // outcomes are no longer of interest, dropping the receiver lets the actions finish
        // without waiting for queue space
        drop(input_receiver);
        for action in actions {
            if let Err(err) = action.await {
                warn!("Display action task failed: {}", err);
            }
        }
    });

    (input_sender, state_receiver, handle)
}
