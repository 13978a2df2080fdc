//! JDY-25M BLE Configuration Protocol
//!
//! This library talks to JDY-25M serial-to-BLE modules through their single
//! command characteristic, which multiplexes every configuration register over
//! one write/notify channel. Requests are correlated with their notified
//! responses by command code.
//!
//! # Modules
//!
//! - `registers`: command codes and the register codec
//! - `cache`: latest response per command code
//! - `event_loop`: single-flow wait with timeout and interrupt
//! - `transport`: the characteristic operations a BLE stack must provide
//! - `channel`: request/response channel over the characteristic
//! - `config`: session and discovery settings
//! - `device`: typed accessors for every register
//! - `report`: identity and configuration reports
//! - `bluez`: discovery and transport on Linux (feature `bluez`)
//! - `types`: Common types, enums and errors used throughout the library

pub mod cache;
pub mod channel;
pub mod config;
pub mod device;
pub mod event_loop;
pub mod registers;
pub mod report;
pub mod transport;
pub mod types;

#[cfg(feature = "bluez")]
pub mod bluez;

pub use channel::CommandChannel;
pub use config::{DiscoveryConfig, SessionConfig};
pub use device::Jdy25m;
pub use event_loop::Interrupter;
pub use registers::{Register, RegisterValue};
pub use report::{DeviceConfiguration, DeviceIdentity, DeviceReport};
pub use transport::{GattCharacteristic, ValueChange};
pub use types::{
    BaudRate, DecodeReason, Jdy25mError, KeyParam, LearnerParam, PasswordType, Result, Role,
    SlotIndex,
};
