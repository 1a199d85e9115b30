//! Transport Factory
//!
//! Selects the push transport for a job once, at construction time, so the
//! stream manager never branches on the transport mode.

use super::config::{GatewayConfig, TransportMode};
use super::gateway::GatewayAdapter;
use super::local::{LocalBufferAdapter, LocalStreamBuffer};
use super::traits::{PushTransport, TransportError};

/// Create a push transport for the given mode
///
/// # Errors
///
/// Returns `TransportError::InvalidState` if the gateway is requested but
/// its endpoint is missing or malformed.
///
/// # Example
///
/// ```ignore
/// let transport = create_transport(TransportMode::Local, &GatewayConfig::default(), &buffer)?;
/// let stream = StreamManager::new(handle, transport);
/// ```
pub fn create_transport(
    mode: TransportMode,
    gateway: &GatewayConfig,
    local: &LocalStreamBuffer,
) -> Result<Box<dyn PushTransport>, TransportError> {
    match mode {
        TransportMode::Gateway => Ok(Box::new(GatewayAdapter::new(gateway)?)),
        TransportMode::Local => Ok(Box::new(LocalBufferAdapter::new(local.clone()))),
    }
}
