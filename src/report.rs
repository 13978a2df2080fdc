//! Identity and configuration reports read from a module

use crate::device::Jdy25m;
use crate::transport::GattCharacteristic;
use crate::types::{BaudRate, KeyParam, LearnerParam, PasswordType, Result, Role};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Who the module is
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub version: String,
    pub name: String,
    pub ibeacon_uuid: Uuid,
    pub mesh_net_id: u16,
    pub mesh_member_address: u16,
}

impl DeviceIdentity {
    pub async fn read<C: GattCharacteristic>(dev: &mut Jdy25m<C>) -> Result<Self> {
        Ok(Self {
            version: dev.read_module_software_version().await?,
            name: dev.read_broadcast_name().await?,
            ibeacon_uuid: dev.read_ibeacon_uuid().await?,
            mesh_net_id: dev.read_mesh_netid().await?,
            mesh_member_address: dev.read_mesh_maddr().await?,
        })
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "version: {}", self.version)?;
        writeln!(f, "name: {}", self.name)?;
        writeln!(f, "ibeacon UUID: {}", self.ibeacon_uuid)?;
        writeln!(f, "mesh netid: {:#x}", self.mesh_net_id)?;
        write!(f, "mesh maddr: {:#x}", self.mesh_member_address)
    }
}

/// How the module is configured
///
/// Registers that do not answer on current firmware (iBeacon sing, key
/// label) are left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceConfiguration {
    pub password: String,
    pub password_type: PasswordType,
    pub baud_rate: BaudRate,
    pub power_on_sleep: u8,
    pub tx_power: u8,
    pub role: Role,
    pub ibeacon_major: u16,
    pub ibeacon_minor: u16,
    pub mesh_member_class: u8,
    pub key_params: Vec<KeyParam>,
    pub subtype: u8,
    pub learn: u8,
    pub learner_params: Vec<LearnerParam>,
    pub device_class: u8,
}

impl DeviceConfiguration {
    pub async fn read<C: GattCharacteristic>(dev: &mut Jdy25m<C>) -> Result<Self> {
        Ok(Self {
            password: dev.read_password_value().await?,
            password_type: dev.read_password_type().await?,
            baud_rate: dev.read_baud_rate().await?,
            power_on_sleep: dev.read_power_on_sleep().await?,
            tx_power: dev.read_tx_power().await?,
            role: dev.read_role().await?,
            ibeacon_major: dev.read_ibeacon_major().await?,
            ibeacon_minor: dev.read_ibeacon_minor().await?,
            mesh_member_class: dev.read_mesh_mclss().await?,
            key_params: dev.read_key_params().await?,
            subtype: dev.read_subtype().await?,
            learn: dev.read_learn().await?,
            learner_params: dev.read_learner_params().await?,
            device_class: dev.read_devclss().await?,
        })
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "]")
}

impl fmt::Display for DeviceConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "password: {}", self.password)?;
        writeln!(f, "password type: {}", self.password_type)?;
        writeln!(f, "baud rate: {}", self.baud_rate)?;
        writeln!(f, "power on sleep: {}", self.power_on_sleep)?;
        writeln!(f, "TX power: {}", self.tx_power)?;
        writeln!(f, "role: {}", self.role)?;
        writeln!(f, "ibeacon ver: {} {}", self.ibeacon_major, self.ibeacon_minor)?;
        writeln!(f, "mesh mclss: {}", self.mesh_member_class)?;
        write!(f, "key params: ")?;
        write_list(f, &self.key_params)?;
        writeln!(f)?;
        writeln!(f, "subtype: {}", self.subtype)?;
        writeln!(f, "learn: {}", self.learn)?;
        write!(f, "learner params: ")?;
        write_list(f, &self.learner_params)?;
        writeln!(f)?;
        write!(f, "dev class: {}", self.device_class)
    }
}

/// Identity and configuration together, as printed by `jdy25m info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceReport {
    pub identity: DeviceIdentity,
    pub configuration: DeviceConfiguration,
}

impl DeviceReport {
    pub async fn read<C: GattCharacteristic>(dev: &mut Jdy25m<C>) -> Result<Self> {
        Ok(Self {
            identity: DeviceIdentity::read(dev).await?,
            configuration: DeviceConfiguration::read(dev).await?,
        })
    }
}

impl fmt::Display for DeviceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n\n{}", self.identity, self.configuration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::registers::*;
    use crate::transport::mock::{frame, MockCharacteristic};

    fn scripted_module() -> MockCharacteristic {
        let mock = MockCharacteristic::new();
        let answer = |code: u16, payload: &[u8]| mock.answer(code, vec![frame(code, payload)]);

        answer(MODULE_VERSION, b"+VERSION=JDY-25M-V1.7313\r\n");
        answer(BROADCAST_NAME, b"JDY-25M");
        answer(IBEACON_UUID, &[0u8; 16]);
        answer(MESH_NET_ID, &[0x18, 0x97]);
        answer(MESH_MEMBER_ADDRESS, &[0x00, 0x01]);

        answer(PASSWORD_VALUE, b"123456");
        answer(PASSWORD_TYPE, &[0x00]);
        answer(BAUD_RATE, &[0x04]);
        answer(POWER_ON_SLEEP, &[0x01]);
        answer(TX_POWER, &[0x03]);
        answer(ROLE, &[0x05]);
        answer(IBEACON_MAJOR, &[0x00, 0x0A]);
        answer(IBEACON_MINOR, &[0x00, 0x07]);
        answer(MESH_MEMBER_CLASS, &[0x00]);
        for slot in 1..=5u16 {
            answer(KEY_PARAM_BASE + slot, &[0x00, 0x00, 0x00, 0x00]);
            answer(LEARNER_PARAM_BASE + slot, &[0x00, 0x00, 0x00]);
        }
        answer(SUBTYPE, &[0x02]);
        answer(LEARN, &[0x00]);
        answer(DEVICE_CLASS, &[0x01]);
        mock
    }

    #[tokio::test]
    async fn test_read_identity() {
        let mock = scripted_module();
        let mut dev = Jdy25m::open(mock.clone(), SessionConfig::default())
            .await
            .unwrap();

        let identity = DeviceIdentity::read(&mut dev).await.unwrap();
        assert_eq!(identity.version, "JDY-25M-V1.7313");
        assert_eq!(identity.mesh_net_id, 0x1897);
        assert_eq!(
            identity.to_string(),
            "version: JDY-25M-V1.7313\n\
             name: JDY-25M\n\
             ibeacon UUID: 00000000-0000-0000-0000-000000000000\n\
             mesh netid: 0x1897\n\
             mesh maddr: 0x1"
        );
    }

    #[tokio::test]
    async fn test_read_full_report() {
        let mock = scripted_module();
        let mut dev = Jdy25m::open(mock.clone(), SessionConfig::default())
            .await
            .unwrap();

        let report = DeviceReport::read(&mut dev).await.unwrap();
        let config = &report.configuration;
        assert_eq!(config.role, Role::MeshNetwork);
        assert_eq!(config.baud_rate, BaudRate::B9600);
        assert_eq!(config.key_params.len(), 5);
        assert_eq!(config.learner_params.len(), 5);
        // 5 identity reads, 9 scalar reads, 10 slot reads, subtype, learn, class
        assert_eq!(mock.writes().len(), 5 + 9 + 10 + 3);

        let text = report.to_string();
        assert!(text.contains("mesh maddr: 0x1\n\npassword: 123456\n"));
        assert!(text.contains("ibeacon ver: 10 7\n"));
        assert!(text.contains("key params: [target 0x0000 pin 0, "));
        assert!(text.ends_with("dev class: 1"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["identity"]["name"], "JDY-25M");
        assert_eq!(json["configuration"]["role"], "mesh-network");
        assert_eq!(json["configuration"]["baud_rate"], "B9600");
        assert_eq!(
            json["configuration"]["key_params"][0]["full_duplex"],
            false
        );
    }

    #[tokio::test]
    async fn test_report_stops_at_first_error() {
        let mock = scripted_module();
        mock.answer(ROLE, vec![frame(ROLE, &[0x0C])]);
        let mut dev = Jdy25m::open(mock.clone(), SessionConfig::default())
            .await
            .unwrap();

        assert!(DeviceConfiguration::read(&mut dev).await.is_err());
        assert_eq!(mock.writes().last().unwrap(), &vec![0xC1, 0x09]);
    }
}
