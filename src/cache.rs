//! Response cache keyed by command code
//!
//! The device answers every command through the same notification, prefixed
//! with the command code it is answering. The cache remembers the latest
//! payload seen for each code until a caller takes it or a new request for
//! that code clears it.

use log::debug;
use std::collections::HashMap;

/// Latest response payload per command code
#[derive(Debug, Default)]
pub struct ResponseCache {
    values: HashMap<u16, Vec<u8>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload for `code`, replacing any previous one
    pub fn record(&mut self, code: u16, payload: Vec<u8>) {
        debug!("Cache: recorded {} bytes for 0x{:04X}", payload.len(), code);
        self.values.insert(code, payload);
    }

    /// Remove and return the payload for `code`
    pub fn take(&mut self, code: u16) -> Option<Vec<u8>> {
        self.values.remove(&code)
    }

    pub fn contains(&self, code: u16) -> bool {
        self.values.contains_key(&code)
    }

    /// Forget any payload for `code` before issuing a new request for it
    pub fn clear(&mut self, code: u16) {
        if self.values.remove(&code).is_some() {
            debug!("Cache: discarded stale value for 0x{:04X}", code);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_take() {
        let mut cache = ResponseCache::new();
        assert!(cache.is_empty());

        cache.record(0xC102, b"JDY".to_vec());
        assert!(cache.contains(0xC102));
        assert_eq!(cache.take(0xC102), Some(b"JDY".to_vec()));
        assert!(!cache.contains(0xC102));
        assert_eq!(cache.take(0xC102), None);
    }

    #[test]
    fn test_record_overwrites() {
        let mut cache = ResponseCache::new();
        cache.record(0xC109, vec![1]);
        cache.record(0xC109, vec![5]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.take(0xC109), Some(vec![5]));
    }

    #[test]
    fn test_clear_only_touches_one_code() {
        let mut cache = ResponseCache::new();
        cache.record(0xC202, vec![0, 1]);
        cache.record(0xC203, vec![0, 2]);

        cache.clear(0xC202);
        cache.clear(0xC301);

        assert!(!cache.contains(0xC202));
        assert_eq!(cache.take(0xC203), Some(vec![0, 2]));
    }
}
