use crate::device::constants::{PREFIX_ERROR, PREFIX_GESTURE, PREFIX_PERSON};
use crate::device::types::{DomainEvent, Gesture, Presence};

/// Decodes a single line received from the device.
///
/// Trailing line terminators are ignored. Lines without a known prefix decode to
/// [`DomainEvent::Unrecognized`], which callers drop.
pub fn parse_line(line: &str) -> DomainEvent {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(rest) = line.strip_prefix(PREFIX_PERSON) {
        DomainEvent::Presence(Presence::from_wire(rest.trim()))
    }
    else if let Some(rest) = line.strip_prefix(PREFIX_GESTURE) {
        DomainEvent::Gesture(Gesture::from_wire(rest.trim()))
    }
    else if let Some(rest) = line.strip_prefix(PREFIX_ERROR) {
        DomainEvent::DeviceError { message: rest.to_string() }
    }
    else {
        DomainEvent::Unrecognized { raw: line.to_string() }
    }
}
