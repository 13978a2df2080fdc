//! Session and discovery configuration

use crate::registers::{JDY_MESH_CHARACTERISTIC_UUID, JDY_SERVICE_UUID};
use std::time::Duration;
use uuid::Uuid;

/// Configuration for a command session
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// How long a read waits for its response; `None` waits until interrupted
    pub default_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            default_timeout: Some(timeout),
        }
    }
}

/// Configuration for finding a module and its command characteristic
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Service a device must advertise to be considered
    pub service_uuid: Uuid,

    /// Characteristic carrying the command protocol
    pub characteristic_uuid: Uuid,

    /// How long to scan before giving up; `None` scans until a match
    pub scan_timeout: Option<Duration>,

    /// How long to wait for GATT services to be resolved after connecting
    pub resolve_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_uuid: JDY_SERVICE_UUID,
            characteristic_uuid: JDY_MESH_CHARACTERISTIC_UUID,
            scan_timeout: Some(Duration::from_secs(10)),
            resolve_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(SessionConfig::default().default_timeout, None);
        assert_eq!(
            SessionConfig::with_timeout(Duration::from_secs(1)).default_timeout,
            Some(Duration::from_secs(1))
        );

        let discovery = DiscoveryConfig::default();
        assert_eq!(discovery.service_uuid, JDY_SERVICE_UUID);
        assert_eq!(discovery.characteristic_uuid, JDY_MESH_CHARACTERISTIC_UUID);
        assert_eq!(discovery.scan_timeout, Some(Duration::from_secs(10)));
    }
}
