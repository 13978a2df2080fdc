//! Register table and codec for the JDY-25M command characteristic
//!
//! Every logical register of the module is addressed by a 16-bit command code.
//! Reads use the `0xC1xx`..`0xC3xx` range and answer with a payload whose shape
//! depends on the register; writes use the `0xAxEx`/`0xF505` codes and are not
//! acknowledged. This module holds the code table and the pure functions that
//! turn payloads into typed values and back. It does no I/O.

use crate::types::{
    BaudRate, DecodeReason, Jdy25mError, KeyParam, LearnerParam, PasswordType, Result, Role,
    SlotIndex,
};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// GATT service carrying all JDY traffic
pub const JDY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000ffe0_0000_1000_8000_00805f9b34fb);

/// The single read/write/notify characteristic inside [`JDY_SERVICE_UUID`]
pub const JDY_MESH_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x0000ffe3_0000_1000_8000_00805f9b34fb);

/// Company identifier found in JDY advertising data
pub const JDY_MANUFACTURER_ID: u16 = 0x8911;

// Read commands
pub const MODULE_VERSION: u16 = 0xC101;
pub const BROADCAST_NAME: u16 = 0xC102;
pub const PASSWORD_VALUE: u16 = 0xC103;
pub const PASSWORD_TYPE: u16 = 0xC104;
pub const BAUD_RATE: u16 = 0xC105;
pub const POWER_ON_SLEEP: u16 = 0xC106;
pub const ADVERTISING_INTERVAL: u16 = 0xC107;
pub const TX_POWER: u16 = 0xC108;
pub const ROLE: u16 = 0xC109;
pub const IBEACON_UUID: u16 = 0xC201;
pub const IBEACON_MAJOR: u16 = 0xC202;
pub const IBEACON_MINOR: u16 = 0xC203;
pub const IBEACON_SING: u16 = 0xC204;
pub const MESH_NET_ID: u16 = 0xC301;
pub const MESH_MEMBER_ADDRESS: u16 = 0xC302;
pub const MESH_MEMBER_CLASS: u16 = 0xC303;
/// Key slot `i` (1..=5) is read with `KEY_PARAM_BASE + i`
pub const KEY_PARAM_BASE: u16 = 0xC303;
pub const SUBTYPE: u16 = 0xC309;
pub const LEARN: u16 = 0xC30A;
/// Learner slot `i` (1..=5) is read with `LEARNER_PARAM_BASE + i`
pub const LEARNER_PARAM_BASE: u16 = 0xC30A;
pub const DEVICE_CLASS: u16 = 0xC310;
pub const KEY_LABEL: u16 = 0xC311;
pub const KEY_LABEL_TIME: u16 = 0xC312;
pub const KEY_LABEL_RSSI: u16 = 0xC313;

// Write commands
pub const RESET: u16 = 0xA1E1;
pub const SET_BROADCAST_NAME: u16 = 0xA2E2;
pub const SET_PASSWORD_TYPE: u16 = 0xA4E4;
pub const SET_BAUD_RATE: u16 = 0xA5E5;
pub const DISCONNECT: u16 = 0xA6E6;
pub const SET_TX_POWER: u16 = 0xA9E9;
pub const RESTORE_DEFAULTS: u16 = 0xAAEA;
pub const SET_ROLE: u16 = 0xF505;

/// Payload accompanying [`RESET`]
pub const RESET_PAYLOAD: [u8; 2] = [0xF1, 0x01];

/// Payload accompanying [`DISCONNECT`]
pub const DISCONNECT_PAYLOAD: [u8; 1] = [0x01];

/// A logical register of the module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    ModuleVersion,
    BroadcastName,
    PasswordValue,
    PasswordType,
    BaudRate,
    PowerOnSleep,
    AdvertisingInterval,
    TxPower,
    Role,
    IbeaconUuid,
    IbeaconMajor,
    IbeaconMinor,
    IbeaconSing,
    MeshNetId,
    MeshMemberAddress,
    MeshMemberClass,
    KeyParam(SlotIndex),
    Subtype,
    Learn,
    LearnerParam(SlotIndex),
    DeviceClass,
    KeyLabel,
    KeyLabelTime,
    KeyLabelRssi,
}

impl Register {
    /// Every register, slots included, in command-code order
    pub fn all() -> Vec<Register> {
        let mut registers = vec![
            Register::ModuleVersion,
            Register::BroadcastName,
            Register::PasswordValue,
            Register::PasswordType,
            Register::BaudRate,
            Register::PowerOnSleep,
            Register::AdvertisingInterval,
            Register::TxPower,
            Register::Role,
            Register::IbeaconUuid,
            Register::IbeaconMajor,
            Register::IbeaconMinor,
            Register::IbeaconSing,
            Register::MeshNetId,
            Register::MeshMemberAddress,
            Register::MeshMemberClass,
        ];
        registers.extend(SlotIndex::all().map(Register::KeyParam));
        registers.push(Register::Subtype);
        registers.push(Register::Learn);
        registers.extend(SlotIndex::all().map(Register::LearnerParam));
        registers.extend([
            Register::DeviceClass,
            Register::KeyLabel,
            Register::KeyLabelTime,
            Register::KeyLabelRssi,
        ]);
        registers
    }

    /// Command code that reads this register
    pub fn read_code(self) -> u16 {
        match self {
            Register::ModuleVersion => MODULE_VERSION,
            Register::BroadcastName => BROADCAST_NAME,
            Register::PasswordValue => PASSWORD_VALUE,
            Register::PasswordType => PASSWORD_TYPE,
            Register::BaudRate => BAUD_RATE,
            Register::PowerOnSleep => POWER_ON_SLEEP,
            Register::AdvertisingInterval => ADVERTISING_INTERVAL,
            Register::TxPower => TX_POWER,
            Register::Role => ROLE,
            Register::IbeaconUuid => IBEACON_UUID,
            Register::IbeaconMajor => IBEACON_MAJOR,
            Register::IbeaconMinor => IBEACON_MINOR,
            Register::IbeaconSing => IBEACON_SING,
            Register::MeshNetId => MESH_NET_ID,
            Register::MeshMemberAddress => MESH_MEMBER_ADDRESS,
            Register::MeshMemberClass => MESH_MEMBER_CLASS,
            Register::KeyParam(slot) => KEY_PARAM_BASE + u16::from(slot.get()),
            Register::Subtype => SUBTYPE,
            Register::Learn => LEARN,
            Register::LearnerParam(slot) => LEARNER_PARAM_BASE + u16::from(slot.get()),
            Register::DeviceClass => DEVICE_CLASS,
            Register::KeyLabel => KEY_LABEL,
            Register::KeyLabelTime => KEY_LABEL_TIME,
            Register::KeyLabelRssi => KEY_LABEL_RSSI,
        }
    }

    /// Command code that writes this register, if it is writable
    pub fn write_code(self) -> Option<u16> {
        match self {
            Register::BroadcastName => Some(SET_BROADCAST_NAME),
            Register::PasswordType => Some(SET_PASSWORD_TYPE),
            Register::BaudRate => Some(SET_BAUD_RATE),
            Register::TxPower => Some(SET_TX_POWER),
            Register::Role => Some(SET_ROLE),
            _ => None,
        }
    }

    pub fn from_read_code(code: u16) -> Option<Register> {
        Register::all().into_iter().find(|r| r.read_code() == code)
    }

    pub fn from_write_code(code: u16) -> Option<Register> {
        Register::all()
            .into_iter()
            .find(|r| r.write_code() == Some(code))
    }

    /// Name of the value shape this register carries
    pub fn value_kind(self) -> &'static str {
        match self {
            Register::ModuleVersion | Register::BroadcastName | Register::PasswordValue => "text",
            Register::PasswordType => "password type",
            Register::BaudRate => "baud rate",
            Register::Role => "role",
            Register::IbeaconUuid => "UUID",
            Register::IbeaconMajor
            | Register::IbeaconMinor
            | Register::MeshNetId
            | Register::MeshMemberAddress => "u16",
            Register::KeyParam(_) => "key param",
            Register::LearnerParam(_) => "learner param",
            _ => "u8",
        }
    }

    /// Decode a response payload read from this register
    pub fn decode(self, bytes: &[u8]) -> Result<RegisterValue> {
        let code = self.read_code();
        let value = match self {
            Register::ModuleVersion => RegisterValue::Text(decode_version(code, bytes)?),
            Register::BroadcastName | Register::PasswordValue => {
                RegisterValue::Text(decode_text(code, bytes)?)
            }
            Register::PasswordType => {
                RegisterValue::PasswordType(decode_enum(code, bytes, PasswordType::from_u8)?)
            }
            Register::BaudRate => {
                RegisterValue::BaudRate(decode_enum(code, bytes, BaudRate::from_u8)?)
            }
            Register::Role => RegisterValue::Role(decode_enum(code, bytes, Role::from_u8)?),
            Register::IbeaconUuid => RegisterValue::Uuid(decode_uuid(code, bytes)?),
            Register::IbeaconMajor
            | Register::IbeaconMinor
            | Register::MeshNetId
            | Register::MeshMemberAddress => RegisterValue::U16(decode_u16(code, bytes)?),
            Register::KeyParam(_) => RegisterValue::KeyParam(decode_key_param(code, bytes)?),
            Register::LearnerParam(_) => {
                RegisterValue::LearnerParam(decode_learner_param(code, bytes)?)
            }
            Register::PowerOnSleep
            | Register::AdvertisingInterval
            | Register::TxPower
            | Register::IbeaconSing
            | Register::MeshMemberClass
            | Register::Subtype
            | Register::Learn
            | Register::DeviceClass
            | Register::KeyLabel
            | Register::KeyLabelTime
            | Register::KeyLabelRssi => RegisterValue::U8(decode_u8(code, bytes)?),
        };
        Ok(value)
    }

    /// Encode a value as the payload of this register's write command
    pub fn encode(self, value: &RegisterValue) -> Result<Vec<u8>> {
        let code = self
            .write_code()
            .ok_or(Jdy25mError::NotWritable(self.read_code()))?;
        match (self, value) {
            (Register::BroadcastName, RegisterValue::Text(name)) => Ok(encode_text(name)),
            (Register::PasswordType, RegisterValue::PasswordType(typ)) => Ok(vec![typ.to_u8()]),
            (Register::BaudRate, RegisterValue::BaudRate(rate)) => Ok(vec![rate.to_u8()]),
            (Register::TxPower, RegisterValue::U8(power)) => Ok(vec![*power]),
            (Register::Role, RegisterValue::Role(role)) => Ok(vec![role.to_u8()]),
            _ => Err(Jdy25mError::ValueMismatch {
                code,
                expected: self.value_kind(),
            }),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (0x{:04X})", self, self.read_code())
    }
}

/// A decoded register value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RegisterValue {
    Text(String),
    U8(u8),
    U16(u16),
    Uuid(Uuid),
    Role(Role),
    PasswordType(PasswordType),
    BaudRate(BaudRate),
    KeyParam(KeyParam),
    LearnerParam(LearnerParam),
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterValue::Text(s) => write!(f, "{}", s),
            RegisterValue::U8(v) => write!(f, "{}", v),
            RegisterValue::U16(v) => write!(f, "0x{:04x}", v),
            RegisterValue::Uuid(u) => write!(f, "{}", u),
            RegisterValue::Role(r) => write!(f, "{}", r),
            RegisterValue::PasswordType(t) => write!(f, "{}", t),
            RegisterValue::BaudRate(b) => write!(f, "{}", b),
            RegisterValue::KeyParam(k) => write!(f, "{}", k),
            RegisterValue::LearnerParam(l) => write!(f, "{}", l),
        }
    }
}

/// Decode the payload answering read command `code`
pub fn decode(code: u16, bytes: &[u8]) -> Result<RegisterValue> {
    Register::from_read_code(code)
        .ok_or(Jdy25mError::UnknownRegister(code))?
        .decode(bytes)
}

/// Encode the payload for write command `code`
pub fn encode(code: u16, value: &RegisterValue) -> Result<Vec<u8>> {
    match Register::from_write_code(code) {
        Some(register) => register.encode(value),
        None if Register::from_read_code(code).is_some() => Err(Jdy25mError::NotWritable(code)),
        None => Err(Jdy25mError::UnknownRegister(code)),
    }
}

fn decode_error(code: u16, reason: DecodeReason) -> Jdy25mError {
    Jdy25mError::Decode { code, reason }
}

fn exact<const N: usize>(code: u16, bytes: &[u8]) -> Result<[u8; N]> {
    <[u8; N]>::try_from(bytes).map_err(|_| {
        decode_error(
            code,
            DecodeReason::Length {
                expected: N,
                got: bytes.len(),
            },
        )
    })
}

/// First byte of the payload
pub fn decode_u8(code: u16, bytes: &[u8]) -> Result<u8> {
    bytes
        .first()
        .copied()
        .ok_or_else(|| decode_error(code, DecodeReason::Empty))
}

/// Big-endian 16-bit field
pub fn decode_u16(code: u16, bytes: &[u8]) -> Result<u16> {
    Ok(u16::from_be_bytes(exact::<2>(code, bytes)?))
}

/// Single-byte ordinal mapped through `from_u8`
pub fn decode_enum<T>(
    code: u16,
    bytes: &[u8],
    from_u8: fn(u8) -> std::result::Result<T, DecodeReason>,
) -> Result<T> {
    from_u8(decode_u8(code, bytes)?).map_err(|reason| decode_error(code, reason))
}

/// `>HBB`: target address, output pin, full-duplex flag
pub fn decode_key_param(code: u16, bytes: &[u8]) -> Result<KeyParam> {
    let [addr_hi, addr_lo, output_pin, full_duplex] = exact::<4>(code, bytes)?;
    Ok(KeyParam {
        target_address: u16::from_be_bytes([addr_hi, addr_lo]),
        output_pin,
        full_duplex: full_duplex != 0,
    })
}

/// `>BH`: input pin, sender address
pub fn decode_learner_param(code: u16, bytes: &[u8]) -> Result<LearnerParam> {
    let [input_pin, addr_hi, addr_lo] = exact::<3>(code, bytes)?;
    Ok(LearnerParam {
        input_pin,
        sender_address: u16::from_be_bytes([addr_hi, addr_lo]),
    })
}

pub fn decode_text(code: u16, bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| decode_error(code, DecodeReason::InvalidUtf8))
}

/// The version answer looks like `+VERSION=JDY-25M-V1.7313\r\n`; only the part
/// after the last `=` is kept.
pub fn decode_version(code: u16, bytes: &[u8]) -> Result<String> {
    if !bytes.is_ascii() {
        return Err(decode_error(code, DecodeReason::InvalidAscii));
    }
    let text = std::str::from_utf8(bytes).map_err(|_| decode_error(code, DecodeReason::InvalidAscii))?;
    let trimmed = text.trim_end_matches(|c: char| c.is_ascii_whitespace());
    let value = match trimmed.rsplit_once('=') {
        Some((_, value)) => value,
        None => trimmed,
    };
    Ok(value.to_string())
}

pub fn decode_uuid(code: u16, bytes: &[u8]) -> Result<Uuid> {
    Ok(Uuid::from_bytes(exact::<16>(code, bytes)?))
}

pub fn encode_text(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}
