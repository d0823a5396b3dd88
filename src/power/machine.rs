use std::time::Duration;

use crate::device::types::Presence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

/// Side effects requested by a transition, performed by the controller task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerEffect {
    CancelTimer { generation: u64 },
    StartTimer { generation: u64, after: Duration },
    SetDisplay(bool),
}

/// Debounced display power state.
///
/// The display is assumed to be on at startup. Only a sustained absence (no `PRESENT` for the
/// whole debounce interval after the last `AWAY`) turns it off. At most one timer is pending at
/// any time; every timer carries a generation and a fired timer is only honoured if it is still
/// the pending one, so a superseded timer can never turn the display off.
///
/// At most one display action runs at a time. Readings are judged against the state the display
/// is heading to, so a burst of `PRESENT` while it is being turned on asks for nothing more, and
/// `AWAY` during that action arms the timer. A request that contradicts the running action is
/// held back and issued once that action completes.
///
/// The state only changes when the display action reports success. A failed "turn off" leaves
/// the state `On` and a failed "turn on" leaves it `Off`.
#[derive(Debug)]
pub struct PowerStateMachine {
    state: PowerState,
    debounce: Duration,
    pending_timer: Option<u64>,
    next_generation: u64,
    in_flight: Option<bool>,
    queued: Option<bool>,
}

fn state_for(on: bool) -> PowerState {
    if on { PowerState::On } else { PowerState::Off }
}

impl PowerStateMachine {
    pub fn new(debounce: Duration) -> Self {
        PowerStateMachine {
            state: PowerState::On,
            debounce,
            pending_timer: None,
            next_generation: 0,
            in_flight: None,
            queued: None,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn pending_timer(&self) -> Option<u64> {
        self.pending_timer
    }

    /// The display action currently running, if any.
    pub fn in_flight(&self) -> Option<bool> {
        self.in_flight
    }

    /// The state the display ends up in once running and held back actions succeed.
    pub fn target(&self) -> PowerState {
        match self.queued.or(self.in_flight) {
            Some(on) => state_for(on),
            None => self.state,
        }
    }

    fn cancel_timer(&mut self, effects: &mut Vec<PowerEffect>) {
        if let Some(generation) = self.pending_timer.take() {
            effects.push(PowerEffect::CancelTimer { generation });
        }
    }

    fn start_timer(&mut self, effects: &mut Vec<PowerEffect>) {
        self.cancel_timer(effects);

        let generation = self.next_generation;
        self.next_generation += 1;
        self.pending_timer = Some(generation);
        effects.push(PowerEffect::StartTimer { generation, after: self.debounce });
    }

    fn request(&mut self, on: bool, effects: &mut Vec<PowerEffect>) {
        match self.in_flight {
            None => {
                if self.state != state_for(on) {
                    self.in_flight = Some(on);
                    effects.push(PowerEffect::SetDisplay(on));
                }
            },
            Some(running) if running == on => self.queued = None,
            Some(_) => self.queued = Some(on),
        }
    }

    pub fn on_presence(&mut self, presence: &Presence) -> Vec<PowerEffect> {
        let mut effects = Vec::new();

        match (presence, self.target()) {
            (Presence::Present, PowerState::Off) => {
                self.cancel_timer(&mut effects);
                self.request(true, &mut effects);
            },
            (Presence::Away, PowerState::On) => {
                self.start_timer(&mut effects);
            },
            (Presence::Present, PowerState::On) | (Presence::Away, PowerState::Off) => {
                self.cancel_timer(&mut effects);
            },
            (Presence::Other(_), _) => {},
        }

        effects
    }

    pub fn on_timer_fired(&mut self, generation: u64) -> Vec<PowerEffect> {
        if self.pending_timer != Some(generation) {
            return Vec::new();
        }
        self.pending_timer = None;

        let mut effects = Vec::new();
        if self.target() == PowerState::On {
            self.request(false, &mut effects);
        }
        effects
    }

    /// Records the outcome of a display action and issues the held back one, if still needed.
    pub fn on_action_complete(&mut self, on: bool, succeeded: bool) -> Vec<PowerEffect> {
        self.in_flight = None;
        if succeeded {
            self.state = state_for(on);
        }

        let mut effects = Vec::new();
        if let Some(next) = self.queued.take() {
            self.request(next, &mut effects);
        }
        effects
    }
}
