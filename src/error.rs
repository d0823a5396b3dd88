use std::io;
use std::str::Utf8Error;
use std::time::Duration;
use thiserror::Error;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

/// Faults raised while resolving, opening or reading the serial device.
/// All of them are recoverable and feed the reconnection policy.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No serial device found matching {prefixes:?}")]
    NotFound { prefixes: Vec<String> },

    #[error("Failed to enumerate serial ports: {source}")]
    Enumerate { source: serialport::Error },

    #[error("Failed to open serial port {path}: {source}")]
    Open { path: String, source: serialport::Error },

    #[error("Error reading from serial port: {source}")]
    Read { #[from] source: io::Error },

    #[error("Serial port closed")]
    Closed,

    #[error("Serial port task failed: {source}")]
    Task { source: tokio::task::JoinError },
}

impl DeviceError {
    /// True for faults that happened before a device path was known.
    pub fn is_resolution_fault(&self) -> bool {
        matches!(self, DeviceError::NotFound { .. } | DeviceError::Enumerate { .. })
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to reopen serial port after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: DeviceError },
}

#[derive(Error, Debug)]
pub enum PowerError {
    #[error("Failed to spawn display power command: {source}")]
    Spawn { #[from] source: io::Error },

    #[error("Display power command exited with {status}: {stderr}")]
    CommandFailed { status: std::process::ExitStatus, stderr: String },

    #[error("Display power action took longer than {deadline:?}")]
    Timeout { deadline: Duration },
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to bind relay listener: {source}")]
    Listen { source: io::Error },

    #[error("Device session ended: {source}")]
    Exhausted { #[from] source: SessionError },
}
