//! BlueZ transport built on `bluer`
//!
//! Finds JDY modules, resolves their command characteristic and adapts it to
//! [`GattCharacteristic`].

use crate::config::DiscoveryConfig;
use crate::registers::JDY_MANUFACTURER_ID;
use crate::transport::{GattCharacteristic, ValueChange, ValueChanges};
use crate::types::{Jdy25mError, Result};
use async_trait::async_trait;
use bluer::gatt::remote::Characteristic;
use bluer::{
    Adapter, AdapterEvent, Device, DeviceEvent, DeviceProperty, DiscoveryFilter,
    DiscoveryTransport,
};
use futures::stream::{self, Stream, StreamExt};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use tokio::time::timeout;
use uuid::Uuid;

impl From<bluer::Error> for Jdy25mError {
    fn from(e: bluer::Error) -> Self {
        Jdy25mError::BluetoothError(e.to_string())
    }
}

/// The command characteristic of a connected module
#[derive(Clone)]
pub struct BluezCharacteristic {
    inner: Characteristic,
    uuid: Uuid,
}

impl BluezCharacteristic {
    pub fn new(inner: Characteristic, uuid: Uuid) -> Self {
        Self { inner, uuid }
    }
}

#[async_trait(?Send)]
impl GattCharacteristic for BluezCharacteristic {
    fn uuid(&self) -> String {
        self.uuid.to_string()
    }

    async fn write_value(&self, data: &[u8]) -> Result<()> {
        self.inner.write(data).await?;
        Ok(())
    }

    async fn read_raw_value(&self) -> Result<Vec<u8>> {
        Ok(self.inner.read().await?)
    }

    async fn start_notify(&self) -> Result<ValueChanges> {
        let reader = self.inner.notify_io().await?;
        debug!("Notification socket open (MTU {})", reader.mtu());
        let changes = stream::unfold(reader, |mut reader| async move {
            match reader.recv().await {
                Ok(value) => Some((ValueChange::Value(value), reader)),
                Err(e) => {
                    warn!("Notification stream ended: {}", e);
                    None
                }
            }
        });
        Ok(changes.boxed_local())
    }

    async fn stop_notify(&self) -> Result<()> {
        // Notifications stop when the reader handed out by start_notify is dropped
        debug!("Notifications released for {}", self.uuid);
        Ok(())
    }
}

/// A module seen during a scan
#[derive(Debug, Clone, Serialize)]
pub struct ScannedDevice {
    pub address: String,
    pub name: Option<String>,
    /// Advertised manufacturer data under the JDY company identifier
    pub manufacturer_data: Option<Vec<u8>>,
}

impl ScannedDevice {
    pub async fn describe(device: &Device) -> Result<Self> {
        let manufacturer_data = device
            .manufacturer_data()
            .await?
            .and_then(|mut data| data.remove(&JDY_MANUFACTURER_ID));
        Ok(Self {
            address: device.address().to_string(),
            name: device.name().await?,
            manufacturer_data,
        })
    }
}

/// Power the adapter on if it is off
pub async fn ensure_powered(adapter: &Adapter) -> Result<()> {
    if adapter.is_powered().await? {
        debug!("Bluetooth adapter {} is powered on", adapter.name());
        return Ok(());
    }
    info!("Powering adapter {} on...", adapter.name());
    adapter.set_powered(true).await?;
    Ok(())
}

async fn advertises(device: &Device, service_uuid: Uuid) -> Result<bool> {
    Ok(device
        .uuids()
        .await?
        .is_some_and(|uuids| uuids.contains(&service_uuid)))
}

/// Devices BlueZ already knows about that advertise `service_uuid`
pub async fn available_devices(adapter: &Adapter, service_uuid: Uuid) -> Result<Vec<Device>> {
    let mut devices = Vec::new();
    for address in adapter.device_addresses().await? {
        let device = adapter.device(address)?;
        if advertises(&device, service_uuid).await? {
            devices.push(device);
        }
    }
    debug!("{} known devices advertise {}", devices.len(), service_uuid);
    Ok(devices)
}

async fn first_advertising(
    adapter: &Adapter,
    events: &mut (impl Stream<Item = AdapterEvent> + Unpin),
    service_uuid: Uuid,
) -> Result<Option<Device>> {
    while let Some(event) = events.next().await {
        if let AdapterEvent::DeviceAdded(address) = event {
            let device = adapter.device(address)?;
            if advertises(&device, service_uuid).await? {
                return Ok(Some(device));
            }
            debug!("Ignoring {}", address);
        }
    }
    Ok(None)
}

/// Scan for a device advertising the configured service
///
/// Stops at the first match or when the scan timeout passes.
pub async fn discover(adapter: &Adapter, config: &DiscoveryConfig) -> Result<Vec<Device>> {
    adapter
        .set_discovery_filter(DiscoveryFilter {
            uuids: HashSet::from([config.service_uuid]),
            transport: DiscoveryTransport::Le,
            ..Default::default()
        })
        .await?;

    info!("Scanning for devices advertising {}...", config.service_uuid);
    let mut events = Box::pin(adapter.discover_devices().await?);
    let scan = first_advertising(adapter, &mut events, config.service_uuid);
    let found = match config.scan_timeout {
        Some(limit) => timeout(limit, scan).await.unwrap_or(Ok(None))?,
        None => scan.await?,
    };
    match found {
        Some(device) => Ok(vec![device]),
        None => Err(Jdy25mError::NoDevicesFound),
    }
}

/// Connect to `device` unless it already is
pub async fn connect(device: &Device) -> Result<()> {
    if device.is_connected().await? {
        info!("Already connected to {}", device.address());
    } else {
        info!("Connecting to {}...", device.address());
        device.connect().await?;
    }
    Ok(())
}

/// Wait for GATT services of `device` to be resolved and return the command
/// characteristic
pub async fn resolve_characteristic(
    device: &Device,
    config: &DiscoveryConfig,
) -> Result<BluezCharacteristic> {
    // Subscribe before checking so a change in between is not missed
    let mut events = Box::pin(device.events().await?);
    if !device.is_services_resolved().await? {
        debug!("Waiting for GATT services to be resolved...");
        let resolved = async {
            while let Some(event) = events.next().await {
                if let DeviceEvent::PropertyChanged(DeviceProperty::ServicesResolved(true)) = event
                {
                    return true;
                }
            }
            false
        };
        match timeout(config.resolve_timeout, resolved).await {
            Ok(true) => debug!("GATT services resolved"),
            Ok(false) => {
                return Err(Jdy25mError::BluetoothError(
                    "device went away while resolving services".to_string(),
                ))
            }
            Err(_) => return Err(Jdy25mError::DiscoveryTimedOut),
        }
    }

    for service in device.services().await? {
        if service.uuid().await? != config.service_uuid {
            continue;
        }
        for characteristic in service.characteristics().await? {
            if characteristic.uuid().await? == config.characteristic_uuid {
                debug!("Found characteristic {}", config.characteristic_uuid);
                return Ok(BluezCharacteristic::new(
                    characteristic,
                    config.characteristic_uuid,
                ));
            }
        }
    }
    Err(Jdy25mError::CharacteristicNotFound(
        config.characteristic_uuid.to_string(),
    ))
}
