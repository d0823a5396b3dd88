use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use log::{debug, error, info, warn};
use tokio::net::TcpListener;
use tokio::spawn;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::connection::{DeviceConnector, SerialConnector};
use crate::device::session::DeviceSession;
use crate::device::types::SessionStatus;
use crate::error::AppRunError;
use crate::power::controller::power_controller;
use crate::power::executor::{set_display_with_deadline, CommandDisplayPower, DisplayPower};
use crate::power::machine::PowerState;
use crate::relay::event_bus::{EventBus, EventPublisher};

pub mod config;
pub mod device;
pub mod error;
pub mod power;
pub mod relay;

pub fn init_logging(verbose: bool) {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

/// Values given on the command line, these take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub device: Option<String>,
    pub debounce: Option<Duration>,
    pub listen: Option<SocketAddr>,
}

impl RunOptions {
    pub fn apply(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.device.path = Some(device.clone());
        }
        if let Some(debounce) = self.debounce {
            config.display.debounce = debounce;
        }
        if let Some(listen) = self.listen {
            config.relay.listen = Some(listen);
        }
    }
}

/// Turns the display off before giving up, so that a dead sensor does not leave it on forever.
/// The outcome is only logged.
async fn fail_safe_display_off<P: DisplayPower + ?Sized>(power: &P) {
    warn!("Turning display off before exiting");
    if let Err(err) = set_display_with_deadline(power, false).await {
        error!("Failed to turn display off: {}", err);
    }
}

/// Follows the device session and the display state and logs every change, until `cancel` is
/// cancelled or both sides are gone.
async fn log_status(
    cancel: CancellationToken,
    mut session: watch::Receiver<SessionStatus>,
    mut display: watch::Receiver<PowerState>,
) {
    let mut session_alive = true;
    let mut display_alive = true;

    while session_alive || display_alive {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = session.changed(), if session_alive => match changed {
                Ok(()) => {
                    let status = session.borrow_and_update().clone();
                    debug!("Device {}, failed attempts: {}", status.state, status.reconnect_attempts);
                },
                Err(_) => session_alive = false,
            },
            changed = display.changed(), if display_alive => match changed {
                Ok(()) => {
                    let state = *display.borrow_and_update();
                    info!("Display is {}", if state == PowerState::On { "on" } else { "off" });
                },
                Err(_) => display_alive = false,
            },
        }
    }
}

/// Wires the device session to the power controller and the publisher and runs until `cancel` is
/// cancelled, or until the device is gone for good. In the latter case the display is turned off
/// and [`AppRunError::Exhausted`] is returned.
pub async fn run_pipeline<C, E, P>(
    cancel: CancellationToken,
    connector: C,
    publisher: E,
    power: P,
    config: &Config,
) -> Result<(), AppRunError>
where
    C: DeviceConnector,
    E: EventPublisher,
    P: DisplayPower + Clone,
{
    let controller_cancel = cancel.child_token();
    let (power_sender, display_state, controller_handle) = power_controller(
        controller_cancel.clone(),
        power.clone(),
        config.display.debounce,
    );

    let mut session = DeviceSession::new(connector, publisher, power_sender, &config.device);
    let status_handle = spawn(log_status(controller_cancel.clone(), session.status(), display_state));
    let result = session.run(cancel.clone()).await;

    // no timer or presence driven action may race with the fail-safe below
    controller_cancel.cancel();
    if let Err(err) = controller_handle.await {
        error!("Power controller task failed: {}", err);
    }
    let _ = status_handle.await;

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            error!("{}", err);
            fail_safe_display_off(&power).await;
            cancel.cancel();
            Err(err.into())
        },
    }
}

pub async fn run(options: RunOptions) -> Result<(), AppRunError> {
    let config_io = ConfigIO::open(options.config_path.as_deref())?;
    // only one instance may own the device and the display
    let mut locker = config_io.locker()?;
    let _guard = locker.lock()?;

    // the file is created on open, an empty one is filled with the defaults
    let mut config = config_io.read_or_init().await?;
    options.apply(&mut config);
    info!(
        "Display turns off after {} without presence",
        humantime::format_duration(config.display.debounce),
    );

    let cancel = CancellationToken::new();
    let bus = EventBus::new();

    if let Some(address) = config.relay.listen {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| AppRunError::Listen { source })?;
        info!("Relaying events to subscribers on {}", address);
        spawn(relay::server::serve(cancel.clone(), listener, bus.clone()));
    }

    let signal_cancel = cancel.clone();
    spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down");
                signal_cancel.cancel();
            },
            Err(err) => warn!("Failed to listen for shutdown signal: {}", err),
        }
    });

    let connector = SerialConnector::new(config.device.clone());
    let power = std::sync::Arc::new(CommandDisplayPower::new(&config.display));

    let result = run_pipeline(cancel.clone(), connector, bus, power, &config).await;
    cancel.cancel();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use futures::future::BoxFuture;
    use futures::stream::{self, StreamExt};
    use futures::FutureExt;

    use crate::device::connection::LineStream;
    use crate::device::types::EventKind;
    use crate::error::{DeviceError, PowerError, SessionError};

    #[derive(Default)]
    struct RecordingPower {
        calls: Mutex<Vec<bool>>,
        fail: bool,
    }

    impl DisplayPower for RecordingPower {
        fn set_display(&self, on: bool) -> BoxFuture<'static, Result<(), PowerError>> {
            self.calls.lock().unwrap().push(on);
            let result = if self.fail {
                Err(PowerError::Timeout { deadline: Duration::ZERO })
            } else {
                Ok(())
            };
            async move { result }.boxed()
        }
    }

    // opens `opens` times, each connection delivers `lines` and drops; afterwards the device is gone
    struct FlakyConnector {
        opens: u32,
        lines: Vec<&'static str>,
    }

    impl DeviceConnector for FlakyConnector {
        fn resolve_path(&mut self) -> BoxFuture<'static, Result<String, DeviceError>> {
            let result = if self.opens == 0 {
                Err(DeviceError::NotFound { prefixes: vec!["/dev/ttyUSB".to_string()] })
            } else {
                self.opens -= 1;
                Ok("/dev/ttyUSB0".to_string())
            };
            async move { result }.boxed()
        }

        fn open(&mut self, _path: &str) -> BoxFuture<'static, Result<LineStream, DeviceError>> {
            let items: Vec<Result<String, DeviceError>> = self.lines.iter()
                .map(|line| Ok(line.to_string()))
                .chain(std::iter::once(Err(DeviceError::Closed)))
                .collect();
            async move { Ok(stream::iter(items).boxed()) }.boxed()
        }
    }

    #[tokio::test]
    async fn events_are_relayed_until_device_is_gone() {
        let power = Arc::new(RecordingPower::default());
        let connector = FlakyConnector { opens: 2, lines: vec!["Person: AWAY", "Gesture: LEFT", "ERROR: x"] };
        let bus = EventBus::new();
        let mut subscriber = bus.subscribe();

        let result = run_pipeline(CancellationToken::new(), connector, bus, power.clone(), &Config::default()).await;
        assert!(matches!(result, Err(AppRunError::Exhausted { .. })));

        let mut received = Vec::new();
        while let Ok(message) = subscriber.try_recv() {
            received.push((message.kind, message.payload));
        }
        assert_eq!(received, vec![
            (EventKind::Presence, "AWAY".to_string()),
            (EventKind::Gesture, "LEFT".to_string()),
            (EventKind::Presence, "AWAY".to_string()),
            (EventKind::Gesture, "LEFT".to_string()),
        ]);

        // the debounce timer never fired, the only action is the fail-safe one
        assert_eq!(*power.calls.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn missing_device_fails_safe() {
        struct Missing(Arc<Mutex<u32>>);

        impl DeviceConnector for Missing {
            fn resolve_path(&mut self) -> BoxFuture<'static, Result<String, DeviceError>> {
                *self.0.lock().unwrap() += 1;
                async { Err(DeviceError::NotFound { prefixes: vec![] }) }.boxed()
            }

            fn open(&mut self, _path: &str) -> BoxFuture<'static, Result<LineStream, DeviceError>> {
                unreachable!()
            }
        }

        let power = Arc::new(RecordingPower { fail: true, ..RecordingPower::default() });
        let attempts = Arc::new(Mutex::new(0));
        let cancel = CancellationToken::new();

        let result = run_pipeline(cancel.clone(), Missing(attempts.clone()), EventBus::new(), power.clone(), &Config::default()).await;

        assert!(matches!(result, Err(AppRunError::Exhausted { source: SessionError::Exhausted { attempts: 5, .. } })));
        assert_eq!(*attempts.lock().unwrap(), 5);
        // issued even though it fails
        assert_eq!(*power.calls.lock().unwrap(), vec![false]);
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn command_line_overrides_config() {
        let options = RunOptions {
            config_path: None,
            device: Some("/dev/ttyACM0".to_string()),
            debounce: Some(Duration::from_secs(60)),
            listen: None,
        };
        let mut config = Config::default();
        config.relay.listen = Some("127.0.0.1:9000".parse().unwrap());
        options.apply(&mut config);

        assert_eq!(config.device.path.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.display.debounce, Duration::from_secs(60));
        assert_eq!(config.relay.listen, Some("127.0.0.1:9000".parse().unwrap()));
    }

    #[tokio::test]
    async fn status_logging_ends_with_its_sources() {
        let (session_sender, session_receiver) = watch::channel(SessionStatus::initial());
        let (display_sender, display_receiver) = watch::channel(PowerState::On);
        let handle = spawn(log_status(CancellationToken::new(), session_receiver, display_receiver));

        display_sender.send_replace(PowerState::Off);
        session_sender.send_replace(SessionStatus { reconnect_attempts: 1, ..SessionStatus::initial() });
        drop(display_sender);
        drop(session_sender);

        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn status_logging_stops_on_cancel() {
        let (_session_sender, session_receiver) = watch::channel(SessionStatus::initial());
        let (_display_sender, display_receiver) = watch::channel(PowerState::On);
        let cancel = CancellationToken::new();
        let handle = spawn(log_status(cancel.clone(), session_receiver, display_receiver));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
