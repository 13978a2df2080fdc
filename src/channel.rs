//! Command channel over the JDY characteristic
//!
//! The module exposes one writable, notifiable characteristic. A request is a
//! write of `[code:2 BE][payload...]`; the answer arrives later as a
//! notification `[code:2 BE][response...]`. Writes are never acknowledged and
//! answers carry no request identifier, so responses are correlated purely by
//! command code:
//!
//! 1. `read` discards anything cached for the code and writes the code
//! 2. notifications are split into code and payload and cached by code
//! 3. `read` drives the event loop until its code shows up in the cache
//!
//! Only one request per command code may be outstanding at a time.

use crate::cache::ResponseCache;
use crate::config::SessionConfig;
use crate::event_loop::{Deadline, EventLoop, Interrupter, Iteration};
use crate::transport::{hex_dump, GattCharacteristic, ValueChange};
use crate::types::{Jdy25mError, Result};
use log::{debug, info, warn};
use std::time::Duration;

/// Build a request frame: big-endian command code followed by the payload
pub fn encode_frame(code: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(2 + payload.len());
    frame.extend_from_slice(&code.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Split a notification into its command code and payload
///
/// Returns `None` for values too short to carry a code.
pub fn split_frame(frame: &[u8]) -> Option<(u16, &[u8])> {
    if frame.len() < 2 {
        return None;
    }
    Some((u16::from_be_bytes([frame[0], frame[1]]), &frame[2..]))
}

/// Request/response channel bound to one subscribed characteristic
pub struct CommandChannel<C: GattCharacteristic> {
    characteristic: C,
    cache: ResponseCache,
    events: EventLoop,
    config: SessionConfig,
}

impl<C: GattCharacteristic> CommandChannel<C> {
    /// Subscribe to notifications and attach the value-changed handler
    pub async fn open(characteristic: C, config: SessionConfig) -> Result<Self> {
        info!(
            "Starting notifications on characteristic {}",
            characteristic.uuid()
        );
        let events = characteristic.start_notify().await?;
        Ok(Self {
            characteristic,
            cache: ResponseCache::new(),
            events: EventLoop::new(events),
            config,
        })
    }

    /// Detach the handler, stop notifications and hand the characteristic back
    pub async fn close(mut self) -> Result<C> {
        self.events.detach();
        self.characteristic.stop_notify().await?;
        info!(
            "Stopped notifications on characteristic {}",
            self.characteristic.uuid()
        );
        Ok(self.characteristic)
    }

    pub fn characteristic(&self) -> &C {
        &self.characteristic
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Handle that interrupts the current (or next) wait of this channel
    pub fn interrupter(&self) -> Interrupter {
        self.events.interrupter()
    }

    /// Request `code` and wait for its response using the default timeout
    pub async fn read(&mut self, code: u16) -> Result<Vec<u8>> {
        self.read_timeout(code, self.config.default_timeout).await
    }

    /// Request `code` and wait at most `timeout` for its response
    pub async fn read_timeout(&mut self, code: u16, timeout: Option<Duration>) -> Result<Vec<u8>> {
        // Notifications already queued predate this request
        self.drain_pending().await?;
        self.cache.clear(code);
        self.send(code, &[]).await?;
        self.wait_for(code, timeout).await?;
        self.cache
            .take(code)
            .ok_or(Jdy25mError::RequestTimedOut(code))
    }

    /// Write `code` followed by `payload` without waiting for a response
    pub async fn write(&mut self, code: u16, payload: &[u8]) -> Result<()> {
        self.cache.clear(code);
        self.send(code, payload).await
    }

    /// Drive the event loop until a response for `code` is cached
    pub async fn wait_for(&mut self, code: u16, timeout: Option<Duration>) -> Result<()> {
        let mut deadline = Deadline::arm(timeout);
        while !self.cache.contains(code) {
            match self.events.run_once(&mut deadline).await {
                Iteration::Event(change) => self.on_value_changed(change).await?,
                Iteration::TimedOut => {
                    warn!("No response to 0x{:04X} within {:?}", code, timeout);
                    return Err(Jdy25mError::RequestTimedOut(code));
                }
                Iteration::Interrupted => {
                    info!("Wait for 0x{:04X} interrupted", code);
                    return Err(Jdy25mError::InterruptedWait);
                }
                Iteration::Closed => return Err(Jdy25mError::NotificationsClosed),
            }
        }
        Ok(())
    }

    async fn send(&mut self, code: u16, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(code, payload);
        debug!("TX 0x{:04X}: {}", code, hex_dump(&frame, 32));
        self.characteristic.write_value(&frame).await
    }

    async fn drain_pending(&mut self) -> Result<()> {
        for change in self.events.drain_pending() {
            self.on_value_changed(change).await?;
        }
        Ok(())
    }

    /// Handle a value-changed event from the characteristic
    async fn on_value_changed(&mut self, change: ValueChange) -> Result<()> {
        let value = match change {
            ValueChange::Value(value) => value,
            ValueChange::Invalidated => self.characteristic.read_raw_value().await?,
        };
        debug!("RX {}", hex_dump(&value, 32));

        match split_frame(&value) {
            None => warn!("Ignoring {}-byte notification without a command code", value.len()),
            // Some firmware sends an empty echo before the real answer
            Some((code, [])) => debug!("Ignoring empty response to 0x{:04X}", code),
            Some((code, payload)) => self.cache.record(code, payload.to_vec()),
        }
        Ok(())
    }
}
