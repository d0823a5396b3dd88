use log::{debug, info};

use crate::config::types::DeviceConfig;
use crate::error::DeviceError;

/// Picks the device to open from a list of port names.
///
/// The microcontroller may show up on a different node after being replugged, so this runs on
/// every connection attempt. The first match in name order wins.
pub fn select_device_path<I>(port_names: I, prefixes: &[String]) -> Result<String, DeviceError>
where
    I: IntoIterator<Item = String>,
{
    let mut candidates: Vec<String> = port_names
        .into_iter()
        .filter(|name| prefixes.iter().any(|prefix| name.starts_with(prefix.as_str())))
        .collect();
    candidates.sort();

    if candidates.len() > 1 {
        info!("Multiple serial devices found {:?}, using the first one", candidates);
    }

    candidates
        .into_iter()
        .next()
        .ok_or_else(|| DeviceError::NotFound { prefixes: prefixes.to_vec() })
}

pub fn resolve_device_path(config: &DeviceConfig) -> Result<String, DeviceError> {
    if let Some(path) = &config.path {
        return Ok(path.clone());
    }

    let ports = serialport::available_ports()
        .map_err(|source| DeviceError::Enumerate { source })?;
    debug!("Available serial ports: {:?}", ports.iter().map(|port| &port.port_name).collect::<Vec<_>>());

    select_device_path(ports.into_iter().map(|port| port.port_name), &config.path_prefixes)
}
