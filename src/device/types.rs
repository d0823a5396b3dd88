use std::fmt;
use serde::Serialize;

use crate::device::constants::{PREFIX_ERROR, PREFIX_GESTURE, PREFIX_PERSON};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Presence {
    Present,
    Away,
    // the device may report values we do not know about, these are forwarded untouched
    Other(String),
}

impl Presence {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "PRESENT" => Presence::Present,
            "AWAY" => Presence::Away,
            other => Presence::Other(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Presence::Present => "PRESENT",
            Presence::Away => "AWAY",
            Presence::Other(value) => value,
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gesture {
    Left,
    Right,
    Up,
    Down,
    Other(String),
}

impl Gesture {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "LEFT" => Gesture::Left,
            "RIGHT" => Gesture::Right,
            "UP" => Gesture::Up,
            "DOWN" => Gesture::Down,
            other => Gesture::Other(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Gesture::Left => "LEFT",
            Gesture::Right => "RIGHT",
            Gesture::Up => "UP",
            Gesture::Down => "DOWN",
            Gesture::Other(value) => value,
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Presence,
    Gesture,
}

/// One decoded line from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    Presence(Presence),
    Gesture(Gesture),
    DeviceError { message: String },
    Unrecognized { raw: String },
}

impl DomainEvent {
    /// The kind and payload subscribers receive, `None` for events that stay local.
    pub fn broadcast_payload(&self) -> Option<(EventKind, &str)> {
        match self {
            DomainEvent::Presence(presence) => Some((EventKind::Presence, presence.as_wire())),
            DomainEvent::Gesture(gesture) => Some((EventKind::Gesture, gesture.as_wire())),
            DomainEvent::DeviceError { .. } | DomainEvent::Unrecognized { .. } => None,
        }
    }

    /// Serializes the event back into the line the device would have sent.
    pub fn to_line(&self) -> String {
        match self {
            DomainEvent::Presence(presence) => format!("{}{}", PREFIX_PERSON, presence),
            DomainEvent::Gesture(gesture) => format!("{}{}", PREFIX_GESTURE, gesture),
            DomainEvent::DeviceError { message } => format!("{}{}", PREFIX_ERROR, message),
            DomainEvent::Unrecognized { raw } => raw.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open { path: String },
    Closed { reason: String },
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Open { path } => write!(f, "open on {}", path),
            SessionState::Closed { reason } => write!(f, "closed ({})", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub reconnect_attempts: u32,
}

impl SessionStatus {
    pub fn initial() -> Self {
        SessionStatus { state: SessionState::Connecting, reconnect_attempts: 0 }
    }
}
