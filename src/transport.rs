//! Transport abstraction over the JDY command characteristic
//!
//! The platform's BLE stack resolves the service and characteristic; the core
//! only needs to write to it, subscribe to its notifications and, for stacks that
//! only signal "value changed", read the current value back.

use crate::types::Result;
use async_trait::async_trait;
use futures::stream::LocalBoxStream;

/// A change of the characteristic's value as reported by the BLE stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueChange {
    /// The new value was delivered with the notification
    Value(Vec<u8>),
    /// The value changed but has to be fetched with `read_raw_value`
    Invalidated,
}

/// Stream of value changes handed out by [`GattCharacteristic::start_notify`]
///
/// Dropping the stream detaches the value-changed handler.
pub type ValueChanges = LocalBoxStream<'static, ValueChange>;

/// Operations the platform must provide for the command characteristic
#[async_trait(?Send)]
pub trait GattCharacteristic {
    /// UUID of the characteristic, for logging
    fn uuid(&self) -> String;

    /// Write a frame to the characteristic
    async fn write_value(&self, data: &[u8]) -> Result<()>;

    /// Read the characteristic's current value
    async fn read_raw_value(&self) -> Result<Vec<u8>>;

    /// Enable notifications and return the stream of value changes
    async fn start_notify(&self) -> Result<ValueChanges>;

    /// Disable notifications
    async fn stop_notify(&self) -> Result<()>;
}

/// Format bytes as hex for debugging
pub fn hex_dump(data: &[u8], max_len: usize) -> String {
    let len = data.len().min(max_len);
    let hex: String = data[..len]
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");
    if data.len() > max_len {
        format!("{} ... ({} bytes total)", hex, data.len())
    } else {
        format!("{} ({} bytes)", hex, data.len())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::types::Jdy25mError;
    use futures::channel::mpsc::{unbounded, UnboundedSender};
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Notification carrying `code` followed by `payload`
    pub(crate) fn frame(code: u16, payload: &[u8]) -> ValueChange {
        let mut value = code.to_be_bytes().to_vec();
        value.extend_from_slice(payload);
        ValueChange::Value(value)
    }

    #[derive(Default)]
    struct MockState {
        writes: Vec<Vec<u8>>,
        raw_value: Vec<u8>,
        raw_reads: usize,
        subscribes: usize,
        unsubscribes: usize,
        queued: Vec<ValueChange>,
        answers: HashMap<u16, Vec<ValueChange>>,
        sender: Option<UnboundedSender<ValueChange>>,
        fail_writes: bool,
    }

    impl MockState {
        fn deliver(&mut self, change: ValueChange) {
            match &self.sender {
                Some(sender) => {
                    let _ = sender.unbounded_send(change);
                }
                None => self.queued.push(change),
            }
        }
    }

    /// Spy characteristic recording every call made by the channel
    #[derive(Clone, Default)]
    pub(crate) struct MockCharacteristic {
        state: Arc<Mutex<MockState>>,
    }

    impl MockCharacteristic {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        /// Notifications to emit every time a frame for `code` is written
        pub(crate) fn answer(&self, code: u16, changes: Vec<ValueChange>) {
            self.state.lock().unwrap().answers.insert(code, changes);
        }

        /// Emit a notification now, or on subscription if nobody listens yet
        pub(crate) fn notify(&self, change: ValueChange) {
            self.state.lock().unwrap().deliver(change);
        }

        /// End the notification stream as a dropped connection would
        pub(crate) fn hang_up(&self) {
            self.state.lock().unwrap().sender = None;
        }

        pub(crate) fn set_raw_value(&self, value: Vec<u8>) {
            self.state.lock().unwrap().raw_value = value;
        }

        pub(crate) fn fail_writes(&self) {
            self.state.lock().unwrap().fail_writes = true;
        }

        pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
            self.state.lock().unwrap().writes.clone()
        }

        pub(crate) fn raw_reads(&self) -> usize {
            self.state.lock().unwrap().raw_reads
        }

        pub(crate) fn subscribes(&self) -> usize {
            self.state.lock().unwrap().subscribes
        }

        pub(crate) fn unsubscribes(&self) -> usize {
            self.state.lock().unwrap().unsubscribes
        }

        /// Whether a value-changed handler is still attached
        pub(crate) fn is_attached(&self) -> bool {
            self.state
                .lock()
                .unwrap()
                .sender
                .as_ref()
                .is_some_and(|sender| !sender.is_closed())
        }
    }

    #[async_trait(?Send)]
    impl GattCharacteristic for MockCharacteristic {
        fn uuid(&self) -> String {
            "0000ffe3-0000-1000-8000-00805f9b34fb".to_string()
        }

        async fn write_value(&self, data: &[u8]) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.fail_writes {
                return Err(Jdy25mError::BluetoothError("write failed".to_string()));
            }
            state.writes.push(data.to_vec());
            if data.len() >= 2 {
                let code = u16::from_be_bytes([data[0], data[1]]);
                let answers = state.answers.get(&code).cloned().unwrap_or_default();
                for change in answers {
                    state.deliver(change);
                }
            }
            Ok(())
        }

        async fn read_raw_value(&self) -> Result<Vec<u8>> {
            let mut state = self.state.lock().unwrap();
            state.raw_reads += 1;
            Ok(state.raw_value.clone())
        }

        async fn start_notify(&self) -> Result<ValueChanges> {
            let mut state = self.state.lock().unwrap();
            state.subscribes += 1;
            let (sender, receiver) = unbounded();
            for change in state.queued.drain(..) {
                let _ = sender.unbounded_send(change);
            }
            state.sender = Some(sender);
            Ok(receiver.boxed_local())
        }

        async fn stop_notify(&self) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.unsubscribes += 1;
            state.sender = None;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump() {
        assert_eq!(hex_dump(&[0xC1, 0x02], 8), "C1 02 (2 bytes)");
        assert_eq!(
            hex_dump(&[0xA5, 0xE5, 0x08, 0x00], 2),
            "A5 E5 ... (4 bytes total)"
        );
        assert_eq!(hex_dump(&[], 4), " (0 bytes)");
    }
}
