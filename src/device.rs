//! Typed access to the registers of a JDY-25M module
//!
//! [`Jdy25m`] is a session: it owns the notification subscription of the
//! command characteristic from [`Jdy25m::open`] until [`Jdy25m::close`]. Use
//! [`Jdy25m::scoped`] to guarantee the subscription is released on every
//! exit path.
//!
//! Some registers do not answer (or writes have no effect) on firmware
//! JDY-25M-V1.7313. They are still exposed; reads of them will time out on
//! such modules.

use crate::channel::CommandChannel;
use crate::config::SessionConfig;
use crate::event_loop::Interrupter;
use crate::registers::{self, *};
use crate::transport::GattCharacteristic;
use crate::types::{
    BaudRate, Jdy25mError, KeyParam, LearnerParam, PasswordType, Result, Role, SlotIndex,
};
use futures::future::LocalBoxFuture;
use log::{info, warn};
use uuid::Uuid;

/// A command session on one JDY-25M module
pub struct Jdy25m<C: GattCharacteristic> {
    channel: CommandChannel<C>,
}

impl<C: GattCharacteristic> Jdy25m<C> {
    /// Subscribe to the command characteristic and start a session
    pub async fn open(characteristic: C, config: SessionConfig) -> Result<Self> {
        Ok(Self {
            channel: CommandChannel::open(characteristic, config).await?,
        })
    }

    /// End the session and hand the characteristic back
    pub async fn close(self) -> Result<C> {
        self.channel.close().await
    }

    /// Run `f` in a session that is closed afterwards, whatever `f` returns
    ///
    /// An error from `f` takes precedence over an error while closing.
    pub async fn scoped<T, F>(characteristic: C, config: SessionConfig, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Jdy25m<C>) -> LocalBoxFuture<'a, Result<T>>,
    {
        let mut session = Self::open(characteristic, config).await?;
        let result = f(&mut session).await;
        match (result, session.close().await) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(_)) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!("Failed to close session after error: {}", close_err);
                Err(e)
            }
        }
    }

    pub fn channel(&self) -> &CommandChannel<C> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut CommandChannel<C> {
        &mut self.channel
    }

    /// Handle for cancelling a pending read, e.g. from a Ctrl-C handler
    pub fn interrupter(&self) -> Interrupter {
        self.channel.interrupter()
    }

    async fn query<T>(&mut self, code: u16, decode: fn(u16, &[u8]) -> Result<T>) -> Result<T> {
        let payload = self.channel.read(code).await?;
        decode(code, &payload)
    }

    /// Read any register and decode it generically
    pub async fn read_register(&mut self, register: Register) -> Result<registers::RegisterValue> {
        let payload = self.channel.read(register.read_code()).await?;
        register.decode(&payload)
    }

    /// Write any writable register
    pub async fn write_register(
        &mut self,
        register: Register,
        value: &registers::RegisterValue,
    ) -> Result<()> {
        let payload = register.encode(value)?;
        let code = register
            .write_code()
            .ok_or(Jdy25mError::NotWritable(register.read_code()))?;
        info!("Setting {} to {}", register, value);
        self.channel.write(code, &payload).await
    }

    pub async fn read_module_software_version(&mut self) -> Result<String> {
        self.query(MODULE_VERSION, decode_version).await
    }

    pub async fn read_broadcast_name(&mut self) -> Result<String> {
        self.query(BROADCAST_NAME, decode_text).await
    }

    pub async fn read_password_value(&mut self) -> Result<String> {
        self.query(PASSWORD_VALUE, decode_text).await
    }

    pub async fn read_password_type(&mut self) -> Result<PasswordType> {
        self.query(PASSWORD_TYPE, |code, bytes| {
            decode_enum(code, bytes, PasswordType::from_u8)
        })
        .await
    }

    pub async fn read_baud_rate(&mut self) -> Result<BaudRate> {
        self.query(BAUD_RATE, |code, bytes| decode_enum(code, bytes, BaudRate::from_u8))
            .await
    }

    pub async fn read_power_on_sleep(&mut self) -> Result<u8> {
        self.query(POWER_ON_SLEEP, decode_u8).await
    }

    pub async fn read_advertising_interval(&mut self) -> Result<u8> {
        self.query(ADVERTISING_INTERVAL, decode_u8).await
    }

    pub async fn read_tx_power(&mut self) -> Result<u8> {
        self.query(TX_POWER, decode_u8).await
    }

    pub async fn read_role(&mut self) -> Result<Role> {
        self.query(ROLE, |code, bytes| decode_enum(code, bytes, Role::from_u8))
            .await
    }

    pub async fn read_ibeacon_uuid(&mut self) -> Result<Uuid> {
        self.query(IBEACON_UUID, decode_uuid).await
    }

    pub async fn read_ibeacon_major(&mut self) -> Result<u16> {
        self.query(IBEACON_MAJOR, decode_u16).await
    }

    pub async fn read_ibeacon_minor(&mut self) -> Result<u16> {
        self.query(IBEACON_MINOR, decode_u16).await
    }

    /// No response on JDY-25M-V1.7313
    pub async fn read_ibeacon_sing(&mut self) -> Result<u8> {
        self.query(IBEACON_SING, decode_u8).await
    }

    pub async fn read_mesh_netid(&mut self) -> Result<u16> {
        self.query(MESH_NET_ID, decode_u16).await
    }

    pub async fn read_mesh_maddr(&mut self) -> Result<u16> {
        self.query(MESH_MEMBER_ADDRESS, decode_u16).await
    }

    pub async fn read_mesh_mclss(&mut self) -> Result<u8> {
        self.query(MESH_MEMBER_CLASS, decode_u8).await
    }

    /// Read key slot `index` (1 to 5)
    pub async fn read_key_param(&mut self, index: u8) -> Result<KeyParam> {
        let code = Register::KeyParam(SlotIndex::new(index)?).read_code();
        self.query(code, decode_key_param).await
    }

    /// Read all five key slots in order
    pub async fn read_key_params(&mut self) -> Result<Vec<KeyParam>> {
        let mut params = Vec::with_capacity(usize::from(SlotIndex::MAX));
        for slot in SlotIndex::all() {
            params.push(self.read_key_param(slot.get()).await?);
        }
        Ok(params)
    }

    pub async fn read_subtype(&mut self) -> Result<u8> {
        self.query(SUBTYPE, decode_u8).await
    }

    pub async fn read_learn(&mut self) -> Result<u8> {
        self.query(LEARN, decode_u8).await
    }

    /// Read learner slot `index` (1 to 5)
    pub async fn read_learner_param(&mut self, index: u8) -> Result<LearnerParam> {
        let code = Register::LearnerParam(SlotIndex::new(index)?).read_code();
        self.query(code, decode_learner_param).await
    }

    /// Read all five learner slots in order
    pub async fn read_learner_params(&mut self) -> Result<Vec<LearnerParam>> {
        let mut params = Vec::with_capacity(usize::from(SlotIndex::MAX));
        for slot in SlotIndex::all() {
            params.push(self.read_learner_param(slot.get()).await?);
        }
        Ok(params)
    }

    pub async fn read_devclss(&mut self) -> Result<u8> {
        self.query(DEVICE_CLASS, decode_u8).await
    }

    /// No response on JDY-25M-V1.7313
    pub async fn read_klabel(&mut self) -> Result<u8> {
        self.query(KEY_LABEL, decode_u8).await
    }

    /// No response on JDY-25M-V1.7313
    pub async fn read_kltime(&mut self) -> Result<u8> {
        self.query(KEY_LABEL_TIME, decode_u8).await
    }

    /// No response on JDY-25M-V1.7313
    pub async fn read_klrssi(&mut self) -> Result<u8> {
        self.query(KEY_LABEL_RSSI, decode_u8).await
    }

    /// Reboot the module
    pub async fn reset_device(&mut self) -> Result<()> {
        info!("Resetting device");
        self.channel.write(RESET, &RESET_PAYLOAD).await
    }

    pub async fn write_broadcast_name(&mut self, name: &str) -> Result<()> {
        info!("Setting broadcast name to {:?}", name);
        self.channel
            .write(SET_BROADCAST_NAME, &encode_text(name))
            .await
    }

    pub async fn write_password_type(&mut self, typ: PasswordType) -> Result<()> {
        info!("Setting password type to {}", typ);
        self.channel.write(SET_PASSWORD_TYPE, &[typ.to_u8()]).await
    }

    pub async fn write_baud_rate(&mut self, rate: BaudRate) -> Result<()> {
        info!("Setting baud rate to {}", rate);
        self.channel.write(SET_BAUD_RATE, &[rate.to_u8()]).await
    }

    /// Ask the module to drop the current BLE connection
    pub async fn disconnect_device(&mut self) -> Result<()> {
        info!("Disconnecting device");
        self.channel.write(DISCONNECT, &DISCONNECT_PAYLOAD).await
    }

    /// No effect on JDY-25M-V1.7313
    pub async fn write_tx_power(&mut self, power: u8) -> Result<()> {
        info!("Setting TX power to {}", power);
        self.channel.write(SET_TX_POWER, &[power]).await
    }

    /// Restore the factory configuration
    pub async fn restore_device_config(&mut self) -> Result<()> {
        info!("Restoring factory configuration");
        self.channel.write(RESTORE_DEFAULTS, &[]).await
    }

    pub async fn write_role(&mut self, role: Role) -> Result<()> {
        info!("Setting role to {}", role);
        self.channel.write(SET_ROLE, &[role.to_u8()]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::RegisterValue;
    use crate::transport::mock::{frame, MockCharacteristic};
    use crate::types::DecodeReason;
    use futures::FutureExt;
    use std::time::Duration;

    async fn open(mock: &MockCharacteristic) -> Jdy25m<MockCharacteristic> {
        Jdy25m::open(mock.clone(), SessionConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_read_role() {
        let mock = MockCharacteristic::new();
        mock.answer(ROLE, vec![frame(ROLE, &[0x05])]);
        let mut dev = open(&mock).await;
        assert_eq!(dev.read_role().await.unwrap(), Role::MeshNetwork);

        mock.answer(ROLE, vec![frame(ROLE, &[0x09])]);
        let err = dev.read_role().await.unwrap_err();
        assert!(matches!(
            err,
            Jdy25mError::Decode {
                code: ROLE,
                reason: DecodeReason::InvalidOrdinal { value: 9, .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_read_broadcast_name() {
        let mock = MockCharacteristic::new();
        mock.answer(BROADCAST_NAME, vec![frame(BROADCAST_NAME, b"JDY")]);
        let mut dev = open(&mock).await;
        assert_eq!(dev.read_broadcast_name().await.unwrap(), "JDY");
        assert_eq!(mock.writes(), vec![vec![0xC1, 0x02]]);
    }

    #[tokio::test]
    async fn test_typed_reads() {
        let mock = MockCharacteristic::new();
        mock.answer(
            MODULE_VERSION,
            vec![frame(MODULE_VERSION, b"+VERSION=JDY-25M-V1.7313\r\n")],
        );
        mock.answer(BAUD_RATE, vec![frame(BAUD_RATE, &[0x04])]);
        mock.answer(PASSWORD_TYPE, vec![frame(PASSWORD_TYPE, &[0x01])]);
        mock.answer(MESH_NET_ID, vec![frame(MESH_NET_ID, &[0x11, 0x22])]);
        let uuid_bytes: Vec<u8> = (0xA0u8..0xB0).collect();
        mock.answer(IBEACON_UUID, vec![frame(IBEACON_UUID, &uuid_bytes)]);
        let mut dev = open(&mock).await;

        assert_eq!(
            dev.read_module_software_version().await.unwrap(),
            "JDY-25M-V1.7313"
        );
        assert_eq!(dev.read_baud_rate().await.unwrap(), BaudRate::B9600);
        assert_eq!(
            dev.read_password_type().await.unwrap(),
            PasswordType::Connection
        );
        assert_eq!(dev.read_mesh_netid().await.unwrap(), 0x1122);
        assert_eq!(
            dev.read_ibeacon_uuid().await.unwrap().as_bytes().to_vec(),
            uuid_bytes
        );
    }

    #[tokio::test]
    async fn test_read_slots() {
        let mock = MockCharacteristic::new();
        for slot in 1..=5u8 {
            let key_code = KEY_PARAM_BASE + u16::from(slot);
            mock.answer(key_code, vec![frame(key_code, &[0x00, slot, slot, 0x01])]);
            let learner_code = LEARNER_PARAM_BASE + u16::from(slot);
            mock.answer(learner_code, vec![frame(learner_code, &[slot, 0x00, slot])]);
        }
        let mut dev = open(&mock).await;

        let key = dev.read_key_param(3).await.unwrap();
        assert_eq!(
            key,
            KeyParam {
                target_address: 3,
                output_pin: 3,
                full_duplex: true
            }
        );
        assert_eq!(mock.writes(), vec![vec![0xC3, 0x06]]);

        let learners = dev.read_learner_params().await.unwrap();
        assert_eq!(learners.len(), 5);
        assert_eq!(
            learners[4],
            LearnerParam {
                input_pin: 5,
                sender_address: 5
            }
        );
        assert_eq!(dev.read_key_params().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_slot_index_checked_before_io() {
        let mock = MockCharacteristic::new();
        let mut dev = open(&mock).await;

        for index in [0u8, 6] {
            assert!(matches!(
                dev.read_key_param(index).await,
                Err(Jdy25mError::PreconditionViolation(_))
            ));
            assert!(matches!(
                dev.read_learner_param(index).await,
                Err(Jdy25mError::PreconditionViolation(_))
            ));
        }
        assert!(mock.writes().is_empty());
    }

    #[tokio::test]
    async fn test_write_frames() {
        let mock = MockCharacteristic::new();
        let mut dev = open(&mock).await;

        dev.reset_device().await.unwrap();
        dev.write_broadcast_name("JDY-25M").await.unwrap();
        dev.write_password_type(PasswordType::ConnectionAndBinding)
            .await
            .unwrap();
        dev.write_baud_rate(BaudRate::B115200).await.unwrap();
        dev.disconnect_device().await.unwrap();
        dev.write_tx_power(2).await.unwrap();
        dev.restore_device_config().await.unwrap();
        dev.write_role(Role::Ibeacon).await.unwrap();

        let mut name_frame = vec![0xA2, 0xE2];
        name_frame.extend_from_slice(b"JDY-25M");
        assert_eq!(
            mock.writes(),
            vec![
                vec![0xA1, 0xE1, 0xF1, 0x01],
                name_frame,
                vec![0xA4, 0xE4, 0x02],
                vec![0xA5, 0xE5, 0x08],
                vec![0xA6, 0xE6, 0x01],
                vec![0xA9, 0xE9, 0x02],
                vec![0xAA, 0xEA],
                vec![0xF5, 0x05, 0x03],
            ]
        );
    }

    #[tokio::test]
    async fn test_generic_register_access() {
        let mock = MockCharacteristic::new();
        mock.answer(IBEACON_MAJOR, vec![frame(IBEACON_MAJOR, &[0x00, 0x2A])]);
        let mut dev = open(&mock).await;

        assert_eq!(
            dev.read_register(Register::IbeaconMajor).await.unwrap(),
            RegisterValue::U16(42)
        );
        dev.write_register(Register::Role, &RegisterValue::Role(Role::MultiSlave))
            .await
            .unwrap();
        assert!(matches!(
            dev.write_register(Register::MeshNetId, &RegisterValue::U16(1))
                .await,
            Err(Jdy25mError::NotWritable(MESH_NET_ID))
        ));
        assert_eq!(mock.writes().last().unwrap(), &vec![0xF5, 0x05, 0x07]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_register_times_out() {
        let mock = MockCharacteristic::new();
        let config = SessionConfig::with_timeout(Duration::from_secs(1));
        let mut dev = Jdy25m::open(mock.clone(), config).await.unwrap();

        assert!(matches!(
            dev.read_klabel().await,
            Err(Jdy25mError::RequestTimedOut(KEY_LABEL))
        ));
    }

    #[tokio::test]
    async fn test_scoped_session() {
        let mock = MockCharacteristic::new();
        mock.answer(TX_POWER, vec![frame(TX_POWER, &[0x03])]);

        let power = Jdy25m::scoped(mock.clone(), SessionConfig::default(), |dev| {
            async move { dev.read_tx_power().await }.boxed_local()
        })
        .await
        .unwrap();
        assert_eq!(power, 3);
        assert_eq!(mock.subscribes(), 1);
        assert_eq!(mock.unsubscribes(), 1);
    }

    #[tokio::test]
    async fn test_scoped_session_closes_on_error() {
        let mock = MockCharacteristic::new();
        mock.answer(ROLE, vec![frame(ROLE, &[0xFF])]);

        let result = Jdy25m::scoped(mock.clone(), SessionConfig::default(), |dev| {
            async move { dev.read_role().await }.boxed_local()
        })
        .await;
        assert!(matches!(result, Err(Jdy25mError::Decode { .. })));
        assert_eq!(mock.unsubscribes(), 1);
        assert!(!mock.is_attached());
    }
}
