use std::io::{ErrorKind, Read};
use std::time::Duration;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use log::{debug, info, warn};
use serialport::SerialPort;
use tokio::sync::mpsc::{channel, Sender};
use tokio::task::spawn_blocking;

use crate::config::types::DeviceConfig;
use crate::device::constants::{LINE_BUFFER, READ_TIMEOUT};
use crate::device::discovery::resolve_device_path;
use crate::error::DeviceError;

/**
 * Lines longer than this (bytes) are not something the firmware sends; they are dropped.
 */
const MAX_LINE_LENGTH: usize = 1024;

/// Lines received from an open device, without the `\n` delimiter. The stream ends with an
/// error item or simply ends when the connection is gone.
pub type LineStream = BoxStream<'static, Result<String, DeviceError>>;

/// Finds and opens the device. A fresh stream is requested for every connection attempt.
pub trait DeviceConnector: Send {
    fn resolve_path(&mut self) -> BoxFuture<'static, Result<String, DeviceError>>;

    fn open(&mut self, path: &str) -> BoxFuture<'static, Result<LineStream, DeviceError>>;
}

pub struct SerialConnector {
    config: DeviceConfig,
}

impl SerialConnector {
    pub fn new(config: DeviceConfig) -> Self {
        SerialConnector { config }
    }
}

fn open_port(path: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, DeviceError> {
    info!("Opening serial port {} at {} baud", path, baud_rate);

    let port = serialport::new(path, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .timeout(Duration::from_millis(READ_TIMEOUT))
        .open()
        .map_err(|source| DeviceError::Open { path: path.to_string(), source })?;

    Ok(port)
}

/// Splits the bytes read from `reader` into lines and sends them to `sender` until the reader
/// fails, or nobody is listening anymore. Runs on a blocking thread.
fn read_lines<R: Read>(mut reader: R, sender: Sender<Result<String, DeviceError>>) {
    let mut buffer = [0u8; 256];
    let mut line: Vec<u8> = Vec::new();
    let mut discarding = false;

    loop {
        if sender.is_closed() {
            debug!("Line receiver dropped, stopping serial reader");
            return;
        }

        let read = match reader.read(&mut buffer) {
            Ok(0) => {
                let _ = sender.blocking_send(Err(DeviceError::Closed));
                return;
            },
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::TimedOut || err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                let _ = sender.blocking_send(Err(DeviceError::Read { source: err }));
                return;
            },
        };

        for &byte in &buffer[..read] {
            if byte == b'\n' {
                if !discarding {
                    let text = String::from_utf8_lossy(&line).into_owned();
                    if sender.blocking_send(Ok(text)).is_err() {
                        return;
                    }
                }
                line.clear();
                discarding = false;
            }
            else if line.len() >= MAX_LINE_LENGTH {
                if !discarding {
                    warn!("Dropping line longer than {} bytes", MAX_LINE_LENGTH);
                    discarding = true;
                }
            }
            else {
                line.push(byte);
            }
        }
    }
}

/// Starts a blocking reader over `reader` and returns its lines as a stream.
pub fn line_stream<R: Read + Send + 'static>(reader: R) -> LineStream {
    let (sender, receiver) = channel::<Result<String, DeviceError>>(LINE_BUFFER);
    spawn_blocking(move || read_lines(reader, sender));

    stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|item| (item, receiver))
    }).boxed()
}

impl DeviceConnector for SerialConnector {
    fn resolve_path(&mut self) -> BoxFuture<'static, Result<String, DeviceError>> {
        let config = self.config.clone();

        // port enumeration walks sysfs and udev
        async move {
            spawn_blocking(move || resolve_device_path(&config))
                .await
                .map_err(|source| DeviceError::Task { source })?
        }.boxed()
    }

    fn open(&mut self, path: &str) -> BoxFuture<'static, Result<LineStream, DeviceError>> {
        let path = path.to_string();
        let baud_rate = self.config.baud_rate;

        async move {
            let port = spawn_blocking(move || open_port(&path, baud_rate))
                .await
                .map_err(|source| DeviceError::Task { source })??;

            if let Err(err) = port.clear(serialport::ClearBuffer::Input) {
                debug!("Failed to clear serial input buffer: {}", err);
            }

            Ok(line_stream(port))
        }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;

    // replays its steps one read at a time, then reports end of file
    struct ScriptedReader {
        steps: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedReader {
        fn new(steps: Vec<io::Result<Vec<u8>>>) -> Self {
            ScriptedReader { steps: steps.into() }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.steps.pop_front() {
                None => Ok(0),
                Some(Err(err)) => Err(err),
                Some(Ok(mut chunk)) => {
                    let len = chunk.len().min(buf.len());
                    buf[..len].copy_from_slice(&chunk[..len]);
                    if len < chunk.len() {
                        self.steps.push_front(Ok(chunk.split_off(len)));
                    }
                    Ok(len)
                },
            }
        }
    }

    async fn collect(reader: ScriptedReader) -> Vec<Result<String, DeviceError>> {
        line_stream(reader).collect().await
    }

    #[tokio::test]
    async fn splits_lines_across_reads() {
        let reader = ScriptedReader::new(vec![
            Ok(b"Person: PRE".to_vec()),
            Ok(b"SENT\r\nGesture: LEFT\r\n".to_vec()),
        ]);

        let items = collect(reader).await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap(), "Person: PRESENT\r");
        assert_eq!(items[1].as_ref().unwrap(), "Gesture: LEFT\r");
        assert!(matches!(items[2], Err(DeviceError::Closed)));
    }

    #[tokio::test]
    async fn timeouts_are_not_errors() {
        let reader = ScriptedReader::new(vec![
            Ok(b"Person: ".to_vec()),
            Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
            Ok(b"AWAY\n".to_vec()),
        ]);

        let items = collect(reader).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Person: AWAY");
    }

    #[tokio::test]
    async fn read_errors_end_the_stream() {
        let reader = ScriptedReader::new(vec![
            Ok(b"Person: AWAY\n".to_vec()),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged")),
            Ok(b"Person: PRESENT\n".to_vec()),
        ]);

        let items = collect(reader).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Person: AWAY");
        assert!(matches!(items[1], Err(DeviceError::Read { .. })));
    }

    #[tokio::test]
    async fn overlong_lines_are_dropped() {
        let mut long = vec![b'x'; MAX_LINE_LENGTH + 10];
        long.push(b'\n');
        let reader = ScriptedReader::new(vec![Ok(long), Ok(b"Gesture: UP\n".to_vec())]);

        let items = collect(reader).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Gesture: UP");
    }

    #[tokio::test]
    async fn invalid_utf8_is_decoded_lossily() {
        let reader = ScriptedReader::new(vec![Ok(b"Gesture: \xffLEFT\n".to_vec())]);

        let items = collect(reader).await;
        assert_eq!(items[0].as_ref().unwrap(), "Gesture: \u{fffd}LEFT");
    }

    #[tokio::test]
    async fn configured_path_is_used_as_is() {
        let config = DeviceConfig { path: Some("/dev/ttyACM3".to_string()), ..DeviceConfig::default() };
        let mut connector = SerialConnector::new(config);

        assert_eq!(connector.resolve_path().await.unwrap(), "/dev/ttyACM3");
    }

    #[tokio::test]
    async fn failed_serial_task_is_reported_as_such() {
        let source = spawn_blocking(|| panic!("serial driver crashed")).await.unwrap_err();
        let fault = DeviceError::Task { source };

        assert!(fault.to_string().starts_with("Serial port task failed"));
        assert!(!fault.is_resolution_fault());
    }
}
