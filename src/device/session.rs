use std::time::Duration;
use futures::channel::mpsc::Sender;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::types::DeviceConfig;
use crate::device::connection::{DeviceConnector, LineStream};
use crate::device::parser::parse_line;
use crate::device::types::{DomainEvent, SessionState, SessionStatus};
use crate::error::{DeviceError, SessionError};
use crate::power::controller::PowerInput;
use crate::relay::event_bus::EventPublisher;

enum ConnectionState {
    Connecting,
    Open {
        path: String,
        lines: LineStream,
    },
    Closed {
        fault: DeviceError,
    },
}

impl ConnectionState {
    fn as_session_state(&self) -> SessionState {
        match self {
            ConnectionState::Connecting => SessionState::Connecting,
            ConnectionState::Open { path, .. } => SessionState::Open { path: path.clone() },
            ConnectionState::Closed { fault } => SessionState::Closed { reason: fault.to_string() },
        }
    }
}

/// Owns the connection to the sensor device.
///
/// Lines are parsed in arrival order; presence and gesture events are published, presence is
/// also forwarded to the display power controller. When the connection is lost (or could not be
/// established) the device is looked up and opened again. After `max_reconnect_attempts`
/// consecutive failures the session gives up with [`SessionError::Exhausted`]. The counter only
/// resets on a successful open.
pub struct DeviceSession<C, E> {
    connector: C,
    publisher: E,
    power: Sender<PowerInput>,
    max_reconnect_attempts: u32,
    reconnect_delay: Duration,
    reconnect_attempts: u32,
    status: watch::Sender<SessionStatus>,
}

impl<C: DeviceConnector, E: EventPublisher> DeviceSession<C, E> {
    pub fn new(connector: C, publisher: E, power: Sender<PowerInput>, config: &DeviceConfig) -> Self {
        let (status, _) = watch::channel(SessionStatus::initial());

        DeviceSession {
            connector,
            publisher,
            power,
            max_reconnect_attempts: config.max_reconnect_attempts,
            reconnect_delay: config.reconnect_delay,
            reconnect_attempts: 0,
            status,
        }
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    fn report(&self, state: &ConnectionState) {
        self.status.send_replace(SessionStatus {
            state: state.as_session_state(),
            reconnect_attempts: self.reconnect_attempts,
        });
    }

    async fn dispatch(&mut self, line: &str) {
        let event = parse_line(line);

        if let Some((kind, payload)) = event.broadcast_payload() {
            info!("Received {:?}: {}", kind, payload);
            self.publisher.publish(kind, payload);
        }

        match event {
            DomainEvent::Presence(presence) => {
                if let Err(err) = self.power.send(PowerInput::Presence(presence)).await {
                    warn!("Display power controller is not running: {}", err);
                }
            },
            DomainEvent::Gesture(_) => {},
            DomainEvent::DeviceError { message } => {
                error!("Device reported: {}", message);
            },
            DomainEvent::Unrecognized { raw } => {
                debug!("Ignoring line from device: {:?}", raw);
            },
        }
    }

    async fn connect(&mut self) -> ConnectionState {
        let path = match self.connector.resolve_path().await {
            Ok(path) => path,
            Err(fault) => {
                warn!("Failed to find device: {}", fault);
                return ConnectionState::Closed { fault };
            },
        };
        info!("Using device {}", path);

        match self.connector.open(&path).await {
            Ok(lines) => {
                info!("Serial port {} opened", path);
                self.reconnect_attempts = 0;
                ConnectionState::Open { path, lines }
            },
            Err(fault) => {
                warn!("Failed to open device: {}", fault);
                ConnectionState::Closed { fault }
            },
        }
    }

    async fn advance_state(&mut self, state: ConnectionState) -> Result<ConnectionState, SessionError> {
        match state {
            ConnectionState::Connecting => Ok(self.connect().await),
            ConnectionState::Open { path, mut lines } => {
                let fault = loop {
                    match lines.next().await {
                        Some(Ok(line)) => self.dispatch(&line).await,
                        Some(Err(fault)) => break fault,
                        None => break DeviceError::Closed,
                    }
                };

                warn!("Serial port {} closed: {}", path, fault);
                Ok(ConnectionState::Closed { fault })
            },
            ConnectionState::Closed { fault } => {
                self.reconnect_attempts += 1;

                if self.reconnect_attempts >= self.max_reconnect_attempts {
                    error!("Failed to reopen serial port after {} attempts", self.reconnect_attempts);
                    return Err(SessionError::Exhausted { attempts: self.reconnect_attempts, last: fault });
                }

                if fault.is_resolution_fault() {
                    info!(
                        "Looking for the device again ({}/{})",
                        self.reconnect_attempts, self.max_reconnect_attempts,
                    );
                } else {
                    info!(
                        "Attempting to reopen serial port ({}/{})",
                        self.reconnect_attempts, self.max_reconnect_attempts,
                    );
                }
                if !self.reconnect_delay.is_zero() {
                    sleep(self.reconnect_delay).await;
                }
                Ok(ConnectionState::Connecting)
            },
        }
    }

    /// Runs the session until it is cancelled (`Ok`) or the reconnection budget is spent.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), SessionError> {
        let mut state = ConnectionState::Connecting;

        loop {
            self.report(&state);

            state = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Device session stopped");
                    return Ok(());
                },
                result = self.advance_state(state) => result?,
            };
        }
    }
}
