//! Common types, enums, and error definitions for the JDY-25M command protocol

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Result type alias for JDY-25M operations
pub type Result<T> = std::result::Result<T, Jdy25mError>;

/// Error types for JDY-25M communication
#[derive(Error, Debug)]
pub enum Jdy25mError {
    #[error("Request 0x{0:04X} timed out")]
    RequestTimedOut(u16),

    #[error("Failed to decode register 0x{code:04X}: {reason}")]
    Decode { code: u16, reason: DecodeReason },

    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("No devices found")]
    NoDevicesFound,

    #[error("Timed out waiting for GATT services to be resolved")]
    DiscoveryTimedOut,

    #[error("Wait interrupted")]
    InterruptedWait,

    #[error("Notification stream closed")]
    NotificationsClosed,

    #[error("Characteristic {0} not found")]
    CharacteristicNotFound(String),

    #[error("Unknown register code: 0x{0:04X}")]
    UnknownRegister(u16),

    #[error("Register 0x{0:04X} is not writable")]
    NotWritable(u16),

    #[error("Register 0x{code:04X} expects a {expected} value")]
    ValueMismatch { code: u16, expected: &'static str },

    #[error("Bluetooth error: {0}")]
    BluetoothError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a response payload could not be turned into a register value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeReason {
    #[error("invalid {kind} ordinal {value}")]
    InvalidOrdinal { kind: &'static str, value: u8 },

    #[error("expected {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },

    #[error("empty payload")]
    Empty,

    #[error("payload is not valid UTF-8")]
    InvalidUtf8,

    #[error("payload is not ASCII")]
    InvalidAscii,
}

/// The configured role of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Role {
    TransparentSlave = 0,
    TransparentMaster = 1,
    BleProbe = 2,
    Ibeacon = 3,
    IbeaconProbe = 4,
    MeshNetwork = 5,
    MultiMaster = 6,
    MultiSlave = 7,
    KeyLabelDetection = 8,
}

impl Role {
    /// Convert an ordinal byte to a Role
    pub fn from_u8(value: u8) -> std::result::Result<Self, DecodeReason> {
        match value {
            0 => Ok(Role::TransparentSlave),
            1 => Ok(Role::TransparentMaster),
            2 => Ok(Role::BleProbe),
            3 => Ok(Role::Ibeacon),
            4 => Ok(Role::IbeaconProbe),
            5 => Ok(Role::MeshNetwork),
            6 => Ok(Role::MultiMaster),
            7 => Ok(Role::MultiSlave),
            8 => Ok(Role::KeyLabelDetection),
            _ => Err(DecodeReason::InvalidOrdinal { kind: "role", value }),
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    fn name(self) -> &'static str {
        match self {
            Role::TransparentSlave => "transparent-slave",
            Role::TransparentMaster => "transparent-master",
            Role::BleProbe => "ble-probe",
            Role::Ibeacon => "ibeacon",
            Role::IbeaconProbe => "ibeacon-probe",
            Role::MeshNetwork => "mesh-network",
            Role::MultiMaster => "multi-master",
            Role::MultiSlave => "multi-slave",
            Role::KeyLabelDetection => "key-label-detection",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = Jdy25mError;

    /// Accepts the kebab-case name or the ordinal
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(value) = s.parse::<u8>() {
            return Role::from_u8(value).map_err(|e| Jdy25mError::InvalidArgument(e.to_string()));
        }
        (0..=8u8)
            .filter_map(|v| Role::from_u8(v).ok())
            .find(|role| role.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Jdy25mError::InvalidArgument(format!("unknown role '{}'", s)))
    }
}

/// The configured authorization requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum PasswordType {
    None = 0,
    Connection = 1,
    ConnectionAndBinding = 2,
}

impl PasswordType {
    pub fn from_u8(value: u8) -> std::result::Result<Self, DecodeReason> {
        match value {
            0 => Ok(PasswordType::None),
            1 => Ok(PasswordType::Connection),
            2 => Ok(PasswordType::ConnectionAndBinding),
            _ => Err(DecodeReason::InvalidOrdinal {
                kind: "password type",
                value,
            }),
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PasswordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordType::None => write!(f, "none"),
            PasswordType::Connection => write!(f, "connection"),
            PasswordType::ConnectionAndBinding => write!(f, "connection-and-binding"),
        }
    }
}

impl FromStr for PasswordType {
    type Err = Jdy25mError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "0" | "none" => Ok(PasswordType::None),
            "1" | "connection" => Ok(PasswordType::Connection),
            "2" | "connection-and-binding" => Ok(PasswordType::ConnectionAndBinding),
            _ => Err(Jdy25mError::InvalidArgument(format!(
                "unknown password type '{}'",
                s
            ))),
        }
    }
}

/// The configured serial baud rate
///
/// Ordinals start at 2; 0 and 1 are not valid rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BaudRate {
    B2400 = 2,
    B4800 = 3,
    B9600 = 4,
    B19200 = 5,
    B38400 = 6,
    B57600 = 7,
    B115200 = 8,
}

/// Ordinal, variant and bits per second for every supported rate
const BAUD_RATES: [(u8, BaudRate, u32); 7] = [
    (2, BaudRate::B2400, 2_400),
    (3, BaudRate::B4800, 4_800),
    (4, BaudRate::B9600, 9_600),
    (5, BaudRate::B19200, 19_200),
    (6, BaudRate::B38400, 38_400),
    (7, BaudRate::B57600, 57_600),
    (8, BaudRate::B115200, 115_200),
];

impl BaudRate {
    pub fn from_u8(value: u8) -> std::result::Result<Self, DecodeReason> {
        BAUD_RATES
            .iter()
            .find(|(ordinal, _, _)| *ordinal == value)
            .map(|(_, rate, _)| *rate)
            .ok_or(DecodeReason::InvalidOrdinal {
                kind: "baud rate",
                value,
            })
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn bits_per_second(self) -> u32 {
        BAUD_RATES
            .iter()
            .find(|(_, rate, _)| *rate == self)
            .map(|(_, _, bps)| *bps)
            .unwrap_or_default()
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits_per_second())
    }
}

impl FromStr for BaudRate {
    type Err = Jdy25mError;

    /// Accepts either bits per second (`115200`) or the ordinal (`8`)
    fn from_str(s: &str) -> Result<Self> {
        let value: u32 = s
            .trim_start_matches(|c| c == 'B' || c == 'b')
            .parse()
            .map_err(|_| Jdy25mError::InvalidArgument(format!("invalid baud rate '{}'", s)))?;
        BAUD_RATES
            .iter()
            .find(|(ordinal, _, bps)| u32::from(*ordinal) == value || *bps == value)
            .map(|(_, rate, _)| *rate)
            .ok_or_else(|| Jdy25mError::InvalidArgument(format!("unsupported baud rate '{}'", s)))
    }
}

/// A description of an output when acting as a keyfob receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyParam {
    pub target_address: u16,
    pub output_pin: u8,
    pub full_duplex: bool,
}

/// A description of an input when acting as a keyfob sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerParam {
    pub input_pin: u8,
    pub sender_address: u16,
}

impl fmt::Display for KeyParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "target 0x{:04x} pin {}{}",
            self.target_address,
            self.output_pin,
            if self.full_duplex { " full-duplex" } else { "" }
        )
    }
}

impl fmt::Display for LearnerParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pin {} sender 0x{:04x}", self.input_pin, self.sender_address)
    }
}

/// 1-based index of a key or learner slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(u8);

impl SlotIndex {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Validate a slot number, rejecting anything outside 1..=5
    pub fn new(index: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&index) {
            Ok(Self(index))
        } else {
            Err(Jdy25mError::PreconditionViolation(format!(
                "slot index {} out of range {}..={}",
                index,
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// All slots in ascending order
    pub fn all() -> impl Iterator<Item = SlotIndex> {
        (Self::MIN..=Self::MAX).map(SlotIndex)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
